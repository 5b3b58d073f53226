use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::comment::{CommentRecord, Verdict};
use crate::config::ScorerConfig;
use crate::counters::{CounterSnapshot, Counters};
use crate::history::{Disposition, InMemoryHistory};
use crate::scorer::{Adjustment, Rejected, Scorer};

#[derive(Clone)]
pub struct AppState {
    pub scorer: Arc<Scorer>,
    pub history: Arc<InMemoryHistory>,
    pub counters: Arc<Counters>,
}

impl AppState {
    /// Scorer wired to a fresh in-memory history.
    pub fn new(cfg: ScorerConfig) -> anyhow::Result<Self> {
        let history = Arc::new(InMemoryHistory::with_capacity(cfg.history.capacity));
        let scorer = Scorer::new(cfg)?.with_history(history.clone());
        Ok(Self {
            scorer: Arc::new(scorer),
            history,
            counters: Arc::new(Counters::new()),
        })
    }

    /// Same resolution as the binary: env path, `config/scorer.toml`, defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(ScorerConfig::load()?)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/check", post(check))
        .route("/comments/{id}/inserted", post(comment_inserted))
        .route("/history", post(report_disposition))
        .route("/stats", get(stats))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct CheckResp {
    verdict: Verdict,
    score: i32,
    /// Store unapproved.
    held: bool,
    /// Abort the submission.
    discard: bool,
    url_count: usize,
    reasons: Vec<Adjustment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected_by: Option<Rejected>,
}

async fn check(
    State(state): State<AppState>,
    Json(comment): Json<CommentRecord>,
) -> Json<CheckResp> {
    let ev = state.scorer.evaluate_detailed(&comment);
    state.counters.record(&ev);

    Json(CheckResp {
        verdict: ev.verdict,
        score: ev.score,
        held: ev.verdict.is_held(),
        discard: ev.verdict.is_discarded(),
        url_count: ev.url_count,
        reasons: ev.adjustments,
        rejected_by: ev.rejected_by,
    })
}

async fn comment_inserted(State(state): State<AppState>, Path(id): Path<i64>) -> StatusCode {
    state.counters.record_inserted(id);
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct DispositionReq {
    name: String,
    email: String,
    #[serde(default)]
    ip: Option<String>,
    disposition: Disposition,
}

async fn report_disposition(
    State(state): State<AppState>,
    Json(req): Json<DispositionReq>,
) -> StatusCode {
    state
        .history
        .record(&req.name, &req.email, req.ip.as_deref(), req.disposition);
    info!(target: "scorer", disposition = ?req.disposition, stored = state.history.len(), "disposition recorded");
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
struct StatsResp {
    #[serde(flatten)]
    counters: CounterSnapshot,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_processed: Option<String>,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResp> {
    let snap = state.counters.snapshot();
    Json(StatsResp {
        summary: snap.summary(),
        last_processed: snap.last_processed_line(),
        counters: snap,
    })
}
