//! Shared failure classification for provider errors

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Category of a provider failure, derived from the error text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    QuotaExceeded,
    RateLimited,
    Unauthorized,
    Unknown,
}

impl FailureKind {
    /// Whether another attempt against the same provider could succeed
    /// later. Fallback does not consult this: any failure moves a request on
    /// to the next provider, and the provider itself is never retried within
    /// that request.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Unknown)
    }

    /// Whether the provider should be taken out of rotation
    pub fn disables_provider(self) -> bool {
        matches!(self, FailureKind::QuotaExceeded | FailureKind::RateLimited)
    }

    pub fn code(self) -> &'static str {
        match self {
            FailureKind::QuotaExceeded => "QUOTA_EXCEEDED",
            FailureKind::RateLimited => "RATE_LIMITED",
            FailureKind::Unauthorized => "UNAUTHORIZED",
            FailureKind::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified failure attached to the provider that raised it
#[derive(Error, Debug, Clone, Serialize)]
#[error("{provider} failed ({kind}): {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: FailureKind,
    pub message: String,
}

const QUOTA_MARKERS: &[&str] = &["quota", "limit exceeded", "insufficient", "usage limit"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "too many requests", "429"];
const UNAUTHORIZED_MARKERS: &[&str] = &["unauthorized", "403", "invalid key"];

/// Classify an error message. Quota markers win over rate-limit markers,
/// which win over authorization markers.
pub fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if contains_any(QUOTA_MARKERS) {
        FailureKind::QuotaExceeded
    } else if contains_any(RATE_LIMIT_MARKERS) {
        FailureKind::RateLimited
    } else if contains_any(UNAUTHORIZED_MARKERS) {
        FailureKind::Unauthorized
    } else {
        FailureKind::Unknown
    }
}

/// Build a [`ProviderError`] for `provider` from any displayable error
pub fn classify(provider: &str, error: &impl fmt::Display) -> ProviderError {
    let message = error.to_string();
    ProviderError {
        provider: provider.to_string(),
        kind: classify_message(&message),
        message,
    }
}
