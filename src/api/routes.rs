//! Route table for the HTTP surface

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::middleware::RateLimitLayer;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let limits = &state.settings.rate_limit;
    let generate = if limits.enabled {
        post(handlers::generate).layer(RateLimitLayer::new(
            limits.requests_per_second,
            limits.burst_size,
        ))
    } else {
        post(handlers::generate)
    };

    let api = Router::new()
        .route("/generate", generate)
        .route("/images/pair", get(handlers::next_pair))
        .route("/images/rate", post(handlers::rate))
        .route("/images/winners", get(handlers::winners))
        .route("/statistics", get(handlers::statistics))
        .route("/leaderboard", get(handlers::leaderboard))
        .route("/status", get(handlers::status));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .nest_service("/images", ServeDir::new(&state.settings.storage.base_path))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
