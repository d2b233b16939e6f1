//! Common error types for the image arena

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::backend::classify::ProviderError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("No image providers available")]
    NoProvidersAvailable,

    #[error("All providers failed, last error from {provider}: {last_error}")]
    AllProvidersExhausted { provider: String, last_error: String },

    #[error("Generation timed out: {0}")]
    GenerationTimeout(String),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("No image pairs have been generated yet")]
    NoPairsYet,

    #[error("All available image pairs have been viewed")]
    AllPairsViewed,

    #[error("Pair not found: {0}")]
    PairNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Image storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<bb8_redis::redis::RedisError> for AppError {
    fn from(err: bb8_redis::redis::RedisError) -> Self {
        AppError::Store(err.to_string())
    }
}

impl From<bb8_redis::bb8::RunError<bb8_redis::redis::RedisError>> for AppError {
    fn from(err: bb8_redis::bb8::RunError<bb8_redis::redis::RedisError>) -> Self {
        AppError::Store(format!("connection pool: {}", err))
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None)
            }
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("invalid_json")),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("invalid_request")),
            AppError::HttpClient(_) | AppError::BackendError(_) | AppError::Provider(_) => {
                (StatusCode::BAD_GATEWAY, "backend_error", None)
            }
            AppError::NoProvidersAvailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "server_error", Some("no_providers_available"))
            }
            AppError::AllProvidersExhausted { .. } => {
                (StatusCode::BAD_GATEWAY, "backend_error", Some("generation_failed"))
            }
            AppError::GenerationTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout_error", Some("generation_timeout"))
            }
            AppError::Cancelled => (StatusCode::REQUEST_TIMEOUT, "cancelled", Some("cancelled")),
            AppError::NoPairsYet => (StatusCode::NOT_FOUND, "not_found_error", Some("NO_PAIRS_YET")),
            AppError::AllPairsViewed => {
                (StatusCode::NOT_FOUND, "not_found_error", Some("ALL_PAIRS_VIEWED"))
            }
            AppError::PairNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found_error", Some("pair_not_found"))
            }
            AppError::Store(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "server_error", Some("store_unavailable"))
            }
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", Some("storage_error")),
        }
    }

    /// Message shown to users; pair sampling outcomes get friendlier wording.
    fn user_message(&self) -> String {
        match self {
            AppError::NoPairsYet => {
                "No image pairs are available yet. New pairs are generated in the background, please try again shortly."
                    .to_string()
            }
            AppError::AllPairsViewed => {
                "You've seen every image pair! Check back later for new ones.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.parts();

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.user_message(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
