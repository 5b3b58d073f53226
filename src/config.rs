// src/config.rs
//! Scorer configuration (TOML).
//!
//! Every field has a default equal to the built-in policy, so an empty file (or no file
//! at all) yields the stock scorer. Resolution order:
//! 1) `$COMMENT_SIEVE_CONFIG`
//! 2) `config/scorer.toml`
//! 3) built-in defaults

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::history::{TrashPenalty, DEFAULT_HISTORY_CAPACITY};

pub const DEFAULT_CONFIG_PATH: &str = "config/scorer.toml";
pub const ENV_CONFIG_PATH: &str = "COMMENT_SIEVE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub scoring: ScoringSection,
    pub urls: UrlSection,
    pub content: ContentSection,
    pub history: HistorySection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    /// Reaching this score (or below) ends the evaluation with a reject.
    pub min_score: i32,
    /// URL cap; a body with this many URLs is rejected outright.
    pub max_urls: usize,
    /// Final score strictly above this → accepted.
    pub accept_above: i32,
    /// Final score strictly below this → rejected.
    pub reject_below: i32,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            min_score: -10,
            max_urls: 7,
            accept_above: 0,
            reject_below: -3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UrlSection {
    pub long_url_len: usize,
    pub short_url_max_len: usize,
    pub short_segment_max_len: usize,
    pub short_host_max_len: usize,
    /// Longest non-whitespace run after `://` that still counts as a URL.
    pub lookahead_limit: usize,
    pub low_trust_tlds: Vec<String>,
}

impl Default for UrlSection {
    fn default() -> Self {
        Self {
            long_url_len: 80,
            short_url_max_len: 35,
            short_segment_max_len: 15,
            short_host_max_len: 10,
            lookahead_limit: 2000,
            low_trust_tlds: ["pl", "jp", "cn", "info", "ly", "st", "site", "online"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentSection {
    /// Flattering openers; matched case-insensitively near the start of the text.
    pub opener_keywords: Vec<String>,
    /// A keyword counts only if it starts before this byte offset.
    pub opener_window: usize,
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            opener_keywords: ["nice", "cool", "neat", "terrific", "wow"]
                .into_iter()
                .map(String::from)
                .collect(),
            opener_window: 11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub trash_penalty: TrashPenalty,
    /// Comments kept by the service's in-memory history; oldest are dropped first.
    pub capacity: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            trash_penalty: TrashPenalty::default(),
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ScorerConfig {
    /// Resolve via env var, then the default path, then built-in defaults.
    pub fn load() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            return Self::from_path(&pb);
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::from_path(&default);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading scorer config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing scorer config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ScorerConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    /// Clamp nonsensical values instead of refusing them.
    pub fn sanitized(mut self) -> Self {
        let s = &mut self.scoring;
        if s.max_urls == 0 {
            s.max_urls = 1;
        }
        if s.min_score > 0 {
            s.min_score = ScoringSection::default().min_score;
        }
        if s.reject_below > s.accept_above {
            // swap to keep a valid band
            std::mem::swap(&mut s.reject_below, &mut s.accept_above);
        }
        if self.history.capacity == 0 {
            self.history.capacity = DEFAULT_HISTORY_CAPACITY;
        }
        if self.urls.lookahead_limit == 0 {
            self.urls.lookahead_limit = UrlSection::default().lookahead_limit;
        }
        self.urls.low_trust_tlds = clean_list(std::mem::take(&mut self.urls.low_trust_tlds));
        self.content.opener_keywords =
            clean_list(std::mem::take(&mut self.content.opener_keywords));
        self
    }
}

/// Trim, lowercase and drop empties; keeps first-seen order since keyword order matters.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim().to_ascii_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}
