//! counters.rs: per-verdict tallies for the dashboard and `/stats`.
//!
//! Consumer side only: the scorer never depends on these succeeding.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

use crate::comment::Verdict;
use crate::scorer::Evaluation;

#[derive(Debug, Default)]
struct State {
    approved: u64,
    moderate: u64,
    spam: u64,
    last_processed_at: Option<DateTime<Utc>>,
    last_comment_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub approved: u64,
    pub moderate: u64,
    pub spam: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_comment_id: Option<u64>,
}

#[derive(Debug, Default)]
pub struct Counters {
    inner: Mutex<State>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, ev: &Evaluation) {
        self.record_at(ev, Utc::now());
    }

    /// Tally one evaluation. The stored comment id is reset until the host reports
    /// which comment it inserted.
    pub fn record_at(&self, ev: &Evaluation, now: DateTime<Utc>) {
        {
            let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            match ev.verdict {
                Verdict::Accepted => s.approved += 1,
                Verdict::Moderate => s.moderate += 1,
                Verdict::Rejected => s.spam += 1,
            }
            s.last_processed_at = Some(now);
            s.last_comment_id = None;
        }

        counter!("comment_sieve_verdicts_total", "verdict" => ev.verdict.as_str()).increment(1);
        if let Some(r) = ev.rejected_by {
            counter!("comment_sieve_hard_rejects_total", "reason" => r.reason.as_str())
                .increment(1);
        }
        histogram!("comment_sieve_score").record(f64::from(ev.score));
    }

    /// Host callback after it stored a comment. Non-positive ids are ignored.
    pub fn record_inserted(&self, id: i64) {
        if id <= 0 {
            return;
        }
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.last_comment_id = Some(id as u64);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        CounterSnapshot {
            approved: s.approved,
            moderate: s.moderate,
            spam: s.spam,
            last_processed_at: s.last_processed_at,
            last_comment_id: s.last_comment_id,
        }
    }
}

impl CounterSnapshot {
    pub fn total(&self) -> u64 {
        self.approved + self.moderate + self.spam
    }

    /// One-line dashboard summary.
    pub fn summary(&self) -> String {
        if self.total() == 0 {
            return "No comment has been processed yet.".to_string();
        }
        format!(
            "{} comments were blocked, {} were held in the moderation queue, while {} passed checks.",
            self.spam, self.moderate, self.approved
        )
    }

    /// "The last comment (#42) was processed on 2025-01-02 @ 10:00 UTC."
    pub fn last_processed_line(&self) -> Option<String> {
        let at = self.last_processed_at?;
        let id = self
            .last_comment_id
            .map(|id| format!(" (#{id})"))
            .unwrap_or_default();
        Some(format!(
            "The last comment{id} was processed on {}.",
            at.format("%Y-%m-%d @ %H:%M UTC")
        ))
    }
}
