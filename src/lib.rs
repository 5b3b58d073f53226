// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod comment;
pub mod config;
pub mod counters;
pub mod history;
pub mod metrics;
pub mod scorer;
pub mod urls;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::comment::{CommentRecord, Verdict};
pub use crate::config::ScorerConfig;
pub use crate::history::{Disposition, HistoryLookup, HistoryRecord, InMemoryHistory, TrashPenalty};
pub use crate::scorer::{Evaluation, RejectReason, Scorer};
