//! Functional tests for the HTTP API

#[path = "../common/mod.rs"]
mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{ByName, MockBackend, Outcome};
use image_arena::{
    api::create_router,
    arena::ArenaService,
    backend::traits::ImageBackend,
    config::Settings,
    gateway::Orchestrator,
    store::MemoryStore,
    AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app(backends: Vec<Arc<dyn ImageBackend>>) -> Router {
    let mut settings = Settings::default();
    settings.rate_limit.enabled = false;

    let orchestrator = Arc::new(Orchestrator::new(Arc::new(ByName)));
    for backend in backends {
        orchestrator.register(backend);
    }
    let arena = ArenaService::new(orchestrator, Arc::new(MemoryStore::new()), &settings.arena);
    create_router(Arc::new(AppState::new(Arc::new(settings), arena)))
}

fn healthy_app() -> Router {
    create_test_app(vec![Arc::new(MockBackend::new("freepik"))])
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn generate(app: &Router) -> Value {
    let (status, body) = send(app, post_json("/api/v1/generate", json!({"prompt": "a cat"}))).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_health_reports_provider_availability() {
    let (status, body) = send(&healthy_app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let app = create_test_app(vec![
        Arc::new(MockBackend::new("a")),
        Arc::new(MockBackend::missing_key("b")),
    ]);
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");

    let app = create_test_app(vec![Arc::new(MockBackend::missing_key("b"))]);
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_generate_returns_persisted_pair() {
    let app = healthy_app();
    let body = generate(&app).await;

    assert_eq!(body["provider"], "freepik");
    assert_eq!(body["prompt"], "a cat");
    assert_eq!(body["persisted"], true);
    assert!(body["pair_id"].as_str().is_some());
    assert!(body["request_id"].as_str().is_some());
    assert_eq!(body["left_url"], "/images/img-0.png");
    assert_eq!(body["right_url"], "/images/img-1.png");
}

#[tokio::test]
async fn test_generate_rejects_blank_prompt() {
    let (status, body) = send(
        &healthy_app(),
        post_json("/api/v1/generate", json!({"prompt": "   "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_generate_without_providers() {
    let app = create_test_app(vec![Arc::new(MockBackend::missing_key("a"))]);
    let (status, body) = send(&app, post_json("/api/v1/generate", json!({"prompt": "x"}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "no_providers_available");
}

#[tokio::test]
async fn test_generate_all_providers_fail() {
    let app = create_test_app(vec![Arc::new(MockBackend::with_outcomes(
        "a",
        vec![Outcome::Fail("upstream exploded")],
    ))]);
    let (status, body) = send(&app, post_json("/api/v1/generate", json!({"prompt": "x"}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "generation_failed");
}

#[tokio::test]
async fn test_pair_before_any_generation() {
    let (status, body) = send(&healthy_app(), get("/api/v1/images/pair")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NO_PAIRS_YET");
}

#[tokio::test]
async fn test_pair_sampling_per_session() {
    let app = healthy_app();
    let generated = generate(&app).await;
    let pair_id = generated["pair_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/api/v1/images/pair?session_id=s1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pair_id"], pair_id.as_str());

    let (status, body) = send(&app, get("/api/v1/images/pair?session_id=s1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "ALL_PAIRS_VIEWED");

    let uri = format!("/api/v1/images/pair?exclude={}", pair_id);
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "ALL_PAIRS_VIEWED");
}

#[tokio::test]
async fn test_rate_and_statistics() {
    let app = healthy_app();
    let generated = generate(&app).await;
    let pair_id = generated["pair_id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        post_json("/api/v1/images/rate", json!({"pair_id": pair_id, "winner": "left"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["recorded"], true);
    assert_eq!(body["winner"], "left");

    let (status, body) = send(&app, get("/api/v1/statistics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_votes"], 1);
    assert_eq!(body["side_wins"]["left"], 1);
    assert_eq!(body["side_wins"]["right"], 0);
    assert_eq!(body["total_pairs"], 1);

    let (_, body) = send(&app, get("/api/v1/leaderboard")).await;
    assert_eq!(body["providers"][0]["provider"], "freepik");
    assert_eq!(body["providers"][0]["wins"]["left"], 1);
    assert_eq!(body["providers"][0]["win_rate"], 100.0);

    let (_, body) = send(&app, get("/api/v1/images/winners?side=left")).await;
    assert_eq!(body["side"], "left");
    assert_eq!(body["pairs"][0]["pair_id"], pair_id);
    assert_eq!(body["pairs"][0]["vote_count"], 1);

    let (_, body) = send(&app, get("/api/v1/images/winners?side=right")).await;
    assert_eq!(body["pairs"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_rate_validation() {
    let app = healthy_app();

    let (status, body) = send(
        &app,
        post_json("/api/v1/images/rate", json!({"pair_id": "p", "winner": "middle"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");

    let (status, body) = send(
        &app,
        post_json("/api/v1/images/rate", json!({"pair_id": "missing", "winner": "right"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "pair_not_found");
}

#[tokio::test]
async fn test_status_lists_providers() {
    let app = create_test_app(vec![
        Arc::new(MockBackend::new("a")),
        Arc::new(MockBackend::missing_key("b")),
    ]);

    let (status, body) = send(&app, get("/api/v1/status?refresh_quota=true")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["available"], 1);
    assert_eq!(body["providers"][1]["name"], "b");
    assert_eq!(body["providers"][1]["available"], false);
}
