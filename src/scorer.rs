// src/scorer.rs
//! Comment scorer: an ordered pipeline of heuristic checks over one comment.
//!
//! Order:
//! 1) URL detection (count, hyperlinks, per-URL shape)
//! 2) declared website URL
//! 3) name & email shape
//! 4) author name used as link text
//! 5) content length, consonant clusters, flattering opener
//! 6) author history
//!
//! Every check returns `Result<(), Rejected>`; `Err` is a hard reject and unwinds via `?`.
//! `EvaluationState::adjust` is the only place the score moves, and it enforces the floor.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::comment::{CommentRecord, Verdict};
use crate::config::ScorerConfig;
use crate::history::{Disposition, HistoryLookup, HistoryRecord};
use crate::urls::{remove_sentinels, strip_tags, UrlInspector, UrlParts};

static STYLED_ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<a\s+([a-z]+=\s*"[^"]*"\s*){2,}>"#).expect("styled anchor regex")
});

static NAME_UNCOMMON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^._\p{Ll}\p{Lu} ]").expect("name charset regex"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[._+a-zA-Z0-9-]+@[a-zA-Z0-9-]+\.[.a-zA-Z0-9-]+$").expect("email regex")
});

static CONSONANTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[b-df-hj-np-tv-xzB-DF-HJ-NP-TV-XZ]{4}").expect("consonant quartet regex")
});

static ANCHOR_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<a\s+[^>]*>").expect("anchor open regex"));

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z'-]+").expect("word regex"));

/// Pipeline stage that produced an adjustment or a reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    UrlDetection,
    WebsiteUrl,
    NameAndEmail,
    Keywords,
    Content,
    AuthorHistory,
}

/// Why an evaluation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Running score reached the floor.
    ScoreFloor,
    /// URL cap reached in the body.
    TooManyUrls,
    /// A URL without a plausible top-level label.
    MalformedTld,
    /// Declared website has a shortener shape.
    ShortWebsiteUrl,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::ScoreFloor => "score_floor",
            RejectReason::TooManyUrls => "too_many_urls",
            RejectReason::MalformedTld => "malformed_tld",
            RejectReason::ShortWebsiteUrl => "short_website_url",
        }
    }
}

/// Hard-reject signal. Not a failure: the verdict is simply `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rejected {
    pub reason: RejectReason,
    pub check: Check,
}

impl Rejected {
    pub fn new(reason: RejectReason, check: Check) -> Self {
        Self { reason, check }
    }
}

/// Outcome of one check; `Err` ends the evaluation.
pub type Step = Result<(), Rejected>;

/// One applied score change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adjustment {
    pub check: Check,
    pub delta: i32,
    pub reason: String,
}

/// Per-evaluation working state. Never shared between evaluations.
#[derive(Debug, Clone)]
pub struct EvaluationState {
    pub score: i32,
    /// Body with backslashes removed.
    pub raw: String,
    /// Body without URLs and tags; empty until URL detection ran.
    pub plain: String,
    pub urls: Vec<String>,
    pub adjustments: Vec<Adjustment>,
    min_score: i32,
}

impl EvaluationState {
    pub fn new(raw: String, min_score: i32) -> Self {
        Self {
            score: 0,
            raw,
            plain: String::new(),
            urls: Vec::new(),
            adjustments: Vec::new(),
            min_score,
        }
    }

    pub fn url_count(&self) -> usize {
        self.urls.len()
    }

    /// Apply `delta` and stop the evaluation once the floor is reached.
    pub fn adjust(&mut self, check: Check, delta: i32, reason: impl Into<String>) -> Step {
        if delta == 0 {
            return Ok(());
        }
        self.score = self.score.saturating_add(delta);
        self.adjustments.push(Adjustment {
            check,
            delta,
            reason: reason.into(),
        });
        if self.score <= self.min_score {
            return Err(Rejected::new(RejectReason::ScoreFloor, check));
        }
        Ok(())
    }
}

/// Full outcome of one evaluation, for explainability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub score: i32,
    pub url_count: usize,
    pub adjustments: Vec<Adjustment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<Rejected>,
}

/// The scorer. Cheap to share behind an `Arc`; holds no per-comment state.
pub struct Scorer {
    cfg: ScorerConfig,
    inspector: UrlInspector,
    history: Option<Arc<dyn HistoryLookup>>,
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer")
            .field("cfg", &self.cfg)
            .field("history", &self.history.is_some())
            .finish()
    }
}

impl Scorer {
    pub fn new(cfg: ScorerConfig) -> anyhow::Result<Self> {
        let inspector = UrlInspector::new(&cfg.urls)?;
        Ok(Self {
            cfg,
            inspector,
            history: None,
        })
    }

    /// Attach the history collaborator consulted at the last step.
    pub fn with_history(mut self, history: Arc<dyn HistoryLookup>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.cfg
    }

    /// Classify one comment, consulting the attached history collaborator (if any).
    pub fn evaluate(&self, comment: &CommentRecord) -> Verdict {
        self.evaluate_detailed(comment).verdict
    }

    pub fn evaluate_detailed(&self, comment: &CommentRecord) -> Evaluation {
        self.run(comment, || self.lookup_history(comment))
    }

    /// Pure variant: history is supplied by the caller instead of looked up.
    pub fn evaluate_with_history(
        &self,
        comment: &CommentRecord,
        history: Option<&HistoryRecord>,
    ) -> Evaluation {
        self.run(comment, || history.cloned())
    }

    /// Map a final score onto the verdict bands.
    pub fn verdict_for(&self, score: i32) -> Verdict {
        let s = &self.cfg.scoring;
        if score > s.accept_above {
            Verdict::Accepted
        } else if score < s.reject_below {
            Verdict::Rejected
        } else {
            Verdict::Moderate
        }
    }

    fn run<F>(&self, comment: &CommentRecord, history: F) -> Evaluation
    where
        F: FnOnce() -> Option<HistoryRecord>,
    {
        let mut st = EvaluationState::new(comment.raw_body(), self.cfg.scoring.min_score);
        let outcome = self.run_checks(comment, &mut st, history);

        let (verdict, rejected_by) = match outcome {
            Ok(()) => (self.verdict_for(st.score), None),
            Err(r) => (Verdict::Rejected, Some(r)),
        };

        debug!(
            target: "scorer",
            id = %anon_hash(&comment.body),
            verdict = verdict.as_str(),
            score = st.score,
            urls = st.url_count(),
            rejected_by = rejected_by.map(|r| r.reason.as_str()),
            reasons = ?st.adjustments.iter().map(|a| a.reason.as_str()).take(8).collect::<Vec<_>>()
        );

        Evaluation {
            verdict,
            score: st.score,
            url_count: st.url_count(),
            adjustments: st.adjustments,
            rejected_by,
        }
    }

    fn run_checks<F>(&self, comment: &CommentRecord, st: &mut EvaluationState, history: F) -> Step
    where
        F: FnOnce() -> Option<HistoryRecord>,
    {
        self.detect_urls(st)?;
        self.check_website_url(comment, st)?;
        self.check_name_and_email(comment, st)?;
        self.check_keywords(comment, st)?;
        self.check_content(comment, st)?;
        if let Some(rec) = history() {
            self.check_author_history(&rec, st)?;
        }
        Ok(())
    }

    fn lookup_history(&self, comment: &CommentRecord) -> Option<HistoryRecord> {
        let lookup = self.history.as_ref()?;
        match lookup.counts(&comment.name, &comment.email, comment.ip_addr()) {
            Ok(rec) => Some(rec),
            Err(e) => {
                warn!(target: "scorer", error = %e, "history lookup failed; scoring without history");
                None
            }
        }
    }

    /* -------- 1) URL detection -------- */

    fn detect_urls(&self, st: &mut EvaluationState) -> Step {
        const C: Check = Check::UrlDetection;
        let cap = self.cfg.scoring.max_urls;

        let ex = self.inspector.extract(&st.raw, cap);
        st.urls = ex.urls;
        let count = st.url_count();

        if count <= 1 {
            st.adjust(C, 2, "at most one link")?;
        } else if count == cap {
            return Err(Rejected::new(RejectReason::TooManyUrls, C));
        }

        st.plain = strip_tags(&ex.with_placeholders);
        if count == 0 {
            return Ok(());
        }

        let (plain, plain_urls) = remove_sentinels(&st.plain);
        st.plain = plain;

        let hyperlinks = count.saturating_sub(plain_urls);
        if hyperlinks > 0 {
            st.adjust(C, to_i32(hyperlinks).saturating_mul(-5), format!("{hyperlinks} link(s) behind anchor markup"))?;
            if STYLED_ANCHOR_RE.is_match(&st.raw) {
                st.adjust(C, -5, "anchor with several attributes")?;
            }
        } else if count > 1 {
            st.adjust(C, -to_i32(count), format!("{count} pasted links"))?;
        }

        let urls = st.urls.clone();
        for url in &urls {
            if self.inspector.is_long(url) {
                st.adjust(C, -1, "long link")?;
            } else {
                let short = self.inspector.is_short(url);
                if short.suspicious {
                    st.adjust(C, -1, "link carries user, port, query or fragment")?;
                }
                if short.short {
                    st.adjust(C, -5, "shortened link")?;
                }
            }
            self.apply_checkup(C, url, st)?;
        }
        Ok(())
    }

    /// Per-URL shape checks shared by body links and the website URL.
    fn apply_checkup(&self, check: Check, url: &str, st: &mut EvaluationState) -> Step {
        let c = self.inspector.checkup(url);
        if c.malformed_tld {
            return Err(Rejected::new(RejectReason::MalformedTld, check));
        }
        if c.low_trust_tld {
            st.adjust(check, -1, "low-trust top-level domain")?;
        }
        if c.uncommon_chars {
            st.adjust(check, -1, "uncommon characters in link")?;
        }
        Ok(())
    }

    /* -------- 2) website URL -------- */

    fn check_website_url(&self, comment: &CommentRecord, st: &mut EvaluationState) -> Step {
        const C: Check = Check::WebsiteUrl;
        let Some(site) = comment.website_url() else {
            return Ok(());
        };

        let short = self.inspector.is_short(site);
        if short.suspicious {
            st.adjust(C, -1, "website carries user, port, query or fragment")?;
        }
        if short.short {
            return Err(Rejected::new(RejectReason::ShortWebsiteUrl, C));
        }

        let before = st.score;
        self.apply_checkup(C, site, st)?;

        let parts = UrlParts::parse(site);
        if parts.host.is_some() && parts.path.is_some() {
            st.adjust(C, -2, "website has a path")?;
        }

        let host = parts.effective_host();
        let hits: Vec<(i32, &'static str)> = st
            .urls
            .iter()
            .filter_map(|url| {
                if url == site {
                    Some((-5, "website repeated in body"))
                } else if !host.is_empty() && contains_ignore_ascii_case(url, host) {
                    Some((-2, "website host linked in body"))
                } else {
                    None
                }
            })
            .collect();
        for (delta, why) in hits {
            st.adjust(C, delta, why)?;
        }

        if st.score == before {
            st.adjust(C, 1, "plain website")?;
        }
        Ok(())
    }

    /* -------- 3) name & email -------- */

    fn check_name_and_email(&self, comment: &CommentRecord, st: &mut EvaluationState) -> Step {
        const C: Check = Check::NameAndEmail;
        let name = comment.name.as_str();
        let email = comment.email.as_str();
        let before = st.score;

        if name.len() > 25 {
            st.adjust(C, -1, "long name")?;
        }
        if email.len() > 50 {
            st.adjust(C, -1, "long email")?;
        }

        let digits = name.bytes().chain(email.bytes()).filter(u8::is_ascii_digit).count();
        if digits > 4 {
            st.adjust(C, 4 - to_i32(digits), format!("{digits} digits in name and email"))?;
        }

        let dots = email.matches('.').count();
        if dots > 3 {
            st.adjust(C, 3 - to_i32(dots), format!("{dots} dots in email"))?;
        }

        let has_vowel = name.bytes().any(|b| b"aeiouAEIOU".contains(&b));
        if !has_vowel || NAME_UNCOMMON_RE.is_match(name) {
            st.adjust(C, -2, "odd name")?;
        }

        if !EMAIL_RE.is_match(email) {
            st.adjust(C, -5, "malformed email")?;
        }

        if st.score == before {
            st.adjust(C, 2, "plain name and email")?;
        }
        Ok(())
    }

    /* -------- 4) name as link text -------- */

    fn check_keywords(&self, comment: &CommentRecord, st: &mut EvaluationState) -> Step {
        if name_is_link_text(&st.raw, &comment.name) {
            st.adjust(Check::Keywords, -5, "author name used as link text")?;
        }
        Ok(())
    }

    /* -------- 5) content -------- */

    fn check_content(&self, comment: &CommentRecord, st: &mut EvaluationState) -> Step {
        const C: Check = Check::Content;
        let words = word_count(&st.plain);
        let urls = to_i32(st.url_count());

        if words <= 30 {
            if urls > 0 {
                if words <= 15 {
                    st.adjust(C, urls.saturating_mul(-2), format!("{words} words around links"))?;
                } else {
                    st.adjust(C, -urls, format!("{words} words around links"))?;
                }
            } else if words <= 15 {
                st.adjust(C, -1, "very short comment")?;
            }
        } else if words < 200 {
            st.adjust(C, 2, "reasonable length")?;
        } else {
            st.adjust(C, -5, "very long comment")?;
        }

        let all = format!(
            "{} {} {} {}",
            comment.name,
            comment.email,
            comment.website.as_deref().unwrap_or_default(),
            st.raw
        );
        let quartets = CONSONANTS_RE.find_iter(&all).count();
        if quartets > 0 {
            st.adjust(C, -to_i32(quartets), format!("{quartets} consonant cluster(s)"))?;
        }

        let window = self.cfg.content.opener_window;
        let lowered = st.plain.to_ascii_lowercase();
        let opener = self
            .cfg
            .content
            .opener_keywords
            .iter()
            .find(|kw| lowered.find(kw.as_str()).is_some_and(|pos| pos < window));
        if let Some(kw) = opener {
            st.adjust(C, -5, format!("opens with \"{kw}\""))?;
        }
        Ok(())
    }

    /* -------- 6) history -------- */

    fn check_author_history(&self, rec: &HistoryRecord, st: &mut EvaluationState) -> Step {
        const C: Check = Check::AuthorHistory;
        if rec.is_empty() {
            return Ok(());
        }
        for (disposition, count) in rec.iter() {
            match disposition {
                Disposition::Approved => {
                    st.adjust(C, to_i32(count as usize), format!("{count} approved before"))?;
                }
                Disposition::Spam if count > 0 => {
                    let delta = 1i32.saturating_sub(to_i32(count as usize).saturating_mul(2));
                    st.adjust(C, delta, format!("{count} spam before"))?;
                }
                Disposition::Trash if count > 0 => {
                    let delta = self.cfg.history.trash_penalty.delta(count);
                    st.adjust(C, delta, format!("{count} trashed before"))?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Words are runs of ASCII letters, `'` and `-`. A leading `'`/`-` and a trailing `-`
/// of the whole text do not count.
pub fn word_count(text: &str) -> usize {
    let mut t = text;
    if t.starts_with(['\'', '-']) {
        t = &t[1..];
    }
    if t.ends_with('-') {
        t = &t[..t.len() - 1];
    }
    WORD_RE.find_iter(t).count()
}

/// `<a ...>{name}</a>` anywhere in `raw`, name compared case-insensitively and literally.
fn name_is_link_text(raw: &str, name: &str) -> bool {
    ANCHOR_OPEN_RE.find_iter(raw).any(|m| {
        strip_prefix_ignore_case(&raw[m.end()..], name).is_some_and(|rest| {
            rest.get(..4)
                .is_some_and(|close| close.eq_ignore_ascii_case("</a>"))
        })
    })
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = text.char_indices();
    for p in prefix.chars() {
        let (_, t) = rest.next()?;
        if !t.to_lowercase().eq(p.to_lowercase()) {
            return None;
        }
    }
    let at = rest.next().map_or(text.len(), |(i, _)| i);
    Some(&text[at..])
}

fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Short stable id for logs; raw comment text is never logged.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
