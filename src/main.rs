//! Comment sieve service: binary entrypoint.
//! Boots the Axum HTTP server with the scorer, counters and Prometheus metrics.

use comment_sieve::{api, metrics::Metrics, AppState, ScorerConfig};
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - COMMENT_SIEVE_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("COMMENT_SIEVE_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scorer=info,warn"));

    // The runtime may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = ScorerConfig::load()?;
    let metrics = Metrics::init(&cfg)?;
    info!(
        target: "scorer",
        max_urls = cfg.scoring.max_urls,
        min_score = cfg.scoring.min_score,
        "scorer config loaded"
    );

    let state = AppState::new(cfg)?;
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
