//! HTTP request handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::arena::{GeneratedPair, RateOutcome, Statistics};
use crate::backend::traits::BackendStatus;
use crate::error::{AppError, Result};
use crate::store::{ImagePair, ProviderStats, Side, WinningPair};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: String,
}

/// POST /api/v1/generate
///
/// The cancellation token fires if the client disconnects, since axum
/// drops the handler future and with it the drop guard.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GeneratedPair>> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let generated = state.arena.generate_pair(&body.prompt, &cancel).await?;
    Ok(Json(generated))
}

#[derive(Debug, Default, Deserialize)]
pub struct PairQuery {
    /// Comma separated pair ids the client already holds
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn split_ids(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// GET /api/v1/images/pair
pub async fn next_pair(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PairQuery>,
) -> Result<Json<ImagePair>> {
    let excluded = split_ids(query.exclude.as_deref());
    let session_id = query.session_id.as_deref().filter(|s| !s.is_empty());
    debug!(excluded = excluded.len(), session = ?session_id, "Sampling pair");

    let pair = state.arena.next_pair(&excluded, session_id).await?;
    Ok(Json(pair))
}

#[derive(Debug, Deserialize)]
pub struct RateBody {
    #[serde(default)]
    pub pair_id: String,
    #[serde(default)]
    pub winner: String,
}

/// POST /api/v1/images/rate
pub async fn rate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RateBody>,
) -> Result<Json<RateOutcome>> {
    let pair_id = body.pair_id.trim();
    if pair_id.is_empty() {
        return Err(AppError::Validation("pair_id is required".to_string()));
    }
    let winner: Side = body.winner.parse()?;

    let outcome = state.arena.rate(pair_id, winner).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/statistics
pub async fn statistics(State(state): State<Arc<AppState>>) -> Result<Json<Statistics>> {
    Ok(Json(state.arena.statistics().await?))
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub providers: Vec<ProviderStats>,
}

/// GET /api/v1/leaderboard
pub async fn leaderboard(State(state): State<Arc<AppState>>) -> Result<Json<LeaderboardResponse>> {
    Ok(Json(LeaderboardResponse {
        providers: state.arena.leaderboard().await?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WinnersQuery {
    #[serde(default)]
    pub side: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WinnersResponse {
    pub side: Side,
    pub pairs: Vec<WinningPair>,
}

/// GET /api/v1/images/winners
pub async fn winners(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WinnersQuery>,
) -> Result<Json<WinnersResponse>> {
    let side = match query.side.as_deref() {
        Some(raw) => raw.parse()?,
        None => Side::Left,
    };

    Ok(Json(WinnersResponse {
        side,
        pairs: state.arena.winners(side).await?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub refresh_quota: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub providers: Vec<BackendStatus>,
    pub available: usize,
    pub total: usize,
}

/// GET /api/v1/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Json<StatusResponse> {
    let orchestrator = state.arena.orchestrator();
    let providers = if query.refresh_quota {
        orchestrator.refresh_quotas().await
    } else {
        orchestrator.statuses()
    };

    Json(StatusResponse {
        available: providers.iter().filter(|s| s.is_available()).count(),
        total: providers.len(),
        providers,
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub providers_available: usize,
    pub providers_total: usize,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let orchestrator = state.arena.orchestrator();
    let available = orchestrator.available_count();
    let total = orchestrator.backend_count();

    let (code, status) = match available {
        0 => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
        n if n < total => (StatusCode::OK, "degraded"),
        _ => (StatusCode::OK, "healthy"),
    };

    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        providers_available: available,
        providers_total: total,
    };

    (code, Json(body)).into_response()
}
