//! Common traits and types for image generation backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::classify::{FailureKind, ProviderError};
use crate::error::{AppError, Result};

/// Request to generate images; immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    prompt: String,
    request_id: String,
    pair_id: String,
    submitted_at: DateTime<Utc>,
}

impl GenerationRequest {
    /// Build a request with fresh identifiers. Rejects blank prompts.
    pub fn new(prompt: impl Into<String>) -> Result<Self> {
        let prompt = prompt.into().trim().to_string();
        if prompt.is_empty() {
            return Err(AppError::Validation("Prompt is required".to_string()));
        }

        Ok(Self {
            prompt,
            request_id: Uuid::new_v4().to_string(),
            pair_id: Uuid::new_v4().to_string(),
            submitted_at: Utc::now(),
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn pair_id(&self) -> &str {
        &self.pair_id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// A generated image after it has been handed to image storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    /// Public URL or path returned by the storage collaborator
    pub location: String,
    pub byte_size: u64,
}

/// Output of a successful generation call
#[derive(Debug, Clone, Default)]
pub struct GenerateOutput {
    pub images: Vec<GeneratedImage>,
    pub metadata: HashMap<String, String>,
}

/// Quota information reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaInfo {
    pub remaining: i64,
    pub total: i64,
    pub renewal_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Live status of a registered backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub available: bool,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_error_count: u32,
    pub quota_exhausted: bool,
    pub rate_limited: bool,
    pub quota: Option<QuotaInfo>,
}

impl BackendStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: true,
            last_error: None,
            last_success_at: None,
            consecutive_error_count: 0,
            quota_exhausted: false,
            rate_limited: false,
            quota: None,
        }
    }

    /// Status for a backend that cannot be used at all, e.g. missing credentials
    pub fn disabled(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            available: false,
            last_error: Some(reason.into()),
            ..Self::new(name)
        }
    }

    pub fn is_available(&self) -> bool {
        self.available && !self.quota_exhausted && !self.rate_limited
    }

    pub fn record_failure(&mut self, error: &ProviderError) {
        self.last_error = Some(error.message.clone());
        self.consecutive_error_count = self.consecutive_error_count.saturating_add(1);
        self.quota_exhausted = error.kind == FailureKind::QuotaExceeded;
        self.rate_limited = error.kind == FailureKind::RateLimited;
        self.available = !error.kind.disables_provider();
    }

    /// The error counter is reduced, not cleared, so a flapping provider
    /// keeps some history.
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.available = true;
        self.last_error = None;
        self.last_success_at = Some(at);
        self.consecutive_error_count = self.consecutive_error_count.saturating_sub(1);
        self.quota_exhausted = false;
        self.rate_limited = false;
    }

    /// Apply the outcome of a successful quota refresh
    pub fn apply_quota_refresh(&mut self, quota: Option<QuotaInfo>) {
        self.rate_limited = false;
        if let Some(quota) = quota {
            self.quota_exhausted = quota.remaining <= 0;
            self.quota = Some(quota);
        }
        self.available = !self.quota_exhausted;
    }
}

/// Closed set of vendor adapters that can be built from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Freepik,
    GoogleImagen,
    LeonardoAi,
    OpenaiCompatible,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Freepik => "freepik",
            BackendKind::GoogleImagen => "google-imagen",
            BackendKind::LeonardoAi => "leonardo-ai",
            BackendKind::OpenaiCompatible => "openai-compatible",
        }
    }
}

/// Trait for image generation backends
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Reason the backend can never be used in this process, if any
    fn unavailable_reason(&self) -> Option<String> {
        None
    }

    /// Generate `count` images for the request and persist them
    async fn generate(
        &self,
        request: &GenerationRequest,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutput>;

    /// Fetch quota information from the vendor. `Ok(None)` means the vendor
    /// does not report quota.
    async fn refresh_quota(&self) -> Result<Option<QuotaInfo>> {
        Ok(None)
    }

    /// Status the orchestrator starts from when the backend is registered
    fn initial_status(&self) -> BackendStatus {
        match self.unavailable_reason() {
            Some(reason) => BackendStatus::disabled(self.name(), reason),
            None => BackendStatus::new(self.name()),
        }
    }
}
