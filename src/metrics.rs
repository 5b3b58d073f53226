use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::ScorerConfig;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if another recorder is already installed.
    pub fn init(cfg: &ScorerConfig) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("comment_sieve_verdicts_total", "Evaluations by verdict");
        describe_counter!(
            "comment_sieve_hard_rejects_total",
            "Evaluations that stopped early, by reason"
        );
        describe_histogram!("comment_sieve_score", "Final score of each evaluation");

        // Static gauges with the active thresholds
        gauge!("comment_sieve_min_score").set(f64::from(cfg.scoring.min_score));
        gauge!("comment_sieve_max_urls").set(cfg.scoring.max_urls as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
