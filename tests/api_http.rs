// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /check (accepted, hard reject, bad payload)
// - POST /history feeding the next /check
// - POST /comments/{id}/inserted + GET /stats

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use comment_sieve::{api, AppState, ScorerConfig};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router() -> Router {
    let state = AppState::new(ScorerConfig::default()).expect("app state");
    api::router(state)
}

fn post_json(uri: &str, payload: &Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST")
}

async fn read_json(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn jane() -> Json {
    json!({
        "name": "Jane Doe",
        "email": "jane.doe@example.com",
        "website": "",
        "body": "Thanks for this wonderful guide, really helped me a lot!"
    })
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    assert_eq!(String::from_utf8_lossy(&bytes).trim(), "OK");
}

#[tokio::test]
async fn api_check_accepts_friendly_comment() {
    let app = test_router();

    let resp = app.oneshot(post_json("/check", &jane())).await.expect("oneshot /check");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    assert_eq!(v["verdict"], "accepted");
    assert_eq!(v["score"], 3);
    assert_eq!(v["held"], false);
    assert_eq!(v["discard"], false);
    assert!(v["reasons"].is_array(), "missing 'reasons'");
    assert!(v.get("rejected_by").is_none());
}

#[tokio::test]
async fn api_check_reports_hard_reject() {
    let app = test_router();

    let payload = json!({
        "name": "Bob",
        "email": "bob@example.com",
        "website": "http://a.co/x",
        "body": "Hello there"
    });
    let resp = app.oneshot(post_json("/check", &payload)).await.expect("oneshot /check");
    let v = read_json(resp).await;

    assert_eq!(v["verdict"], "rejected");
    assert_eq!(v["discard"], true);
    assert_eq!(v["rejected_by"]["reason"], "short_website_url");
    assert_eq!(v["rejected_by"]["check"], "website_url");
}

#[tokio::test]
async fn api_check_rejects_malformed_payload() {
    let app = test_router();

    let resp = app
        .oneshot(post_json("/check", &json!({ "body": "no author" })))
        .await
        .expect("oneshot /check");
    assert!(resp.status().is_client_error(), "got {}", resp.status());
}

#[tokio::test]
async fn api_history_feeds_later_checks() {
    let app = test_router();

    for _ in 0..2 {
        let report = json!({
            "name": "Jane Doe",
            "email": "jane.doe@example.com",
            "disposition": "approved"
        });
        let resp = app
            .clone()
            .oneshot(post_json("/history", &report))
            .await
            .expect("oneshot /history");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    let resp = app.oneshot(post_json("/check", &jane())).await.expect("oneshot /check");
    let v = read_json(resp).await;
    assert_eq!(v["score"], 5);
}

#[tokio::test]
async fn api_stats_tracks_verdicts_and_inserted_id() {
    let app = test_router();

    let req = Request::get("/stats").body(Body::empty()).unwrap();
    let v = read_json(app.clone().oneshot(req).await.unwrap()).await;
    assert_eq!(v["summary"], "No comment has been processed yet.");

    let held = json!({
        "name": "Jane Doe",
        "email": "jane.doe@example.com",
        "body": "Thanks for this wonderful guide, really helped me a lot!"
    });
    app.clone().oneshot(post_json("/check", &held)).await.unwrap();

    let req = Request::post("/comments/42/inserted").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = Request::get("/stats").body(Body::empty()).unwrap();
    let v = read_json(app.oneshot(req).await.unwrap()).await;
    assert_eq!(v["approved"], 1);
    assert_eq!(v["spam"], 0);
    assert_eq!(v["last_comment_id"], 42);
    assert_eq!(
        v["summary"],
        "0 comments were blocked, 0 were held in the moderation queue, while 1 passed checks."
    );
    assert!(v["last_processed"]
        .as_str()
        .is_some_and(|s| s.starts_with("The last comment (#42) was processed on")));
}

#[tokio::test]
async fn api_history_store_is_bounded_by_config() {
    let cfg = ScorerConfig::from_toml_str("[history]\ncapacity = 2\n").unwrap();
    let state = AppState::new(cfg).unwrap();
    let app = api::router(state.clone());

    for i in 0..5 {
        let report = json!({
            "name": format!("bot{i}"),
            "email": "bot@example.com",
            "ip": format!("10.0.0.{i}"),
            "disposition": "spam"
        });
        let resp = app
            .clone()
            .oneshot(post_json("/history", &report))
            .await
            .expect("oneshot /history");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    assert_eq!(state.history.len(), 2);
}
