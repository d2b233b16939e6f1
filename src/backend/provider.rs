//! Shared plumbing for vendor adapters: HTTP client, credential lookup,
//! cancellation and image persistence

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::backend::traits::{BackendKind, GeneratedImage};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::storage::{base64, ImageStorage};

/// Run `fut` unless `cancel` fires first
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

/// Sleep for `duration`, returning early with `Cancelled` if asked to stop
pub async fn cancellable_sleep(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Read a JSON body, turning non-success statuses into errors that carry
/// the status line so failure classification can see it
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(AppError::BackendError(format!(
            "API request failed with status {}: {}",
            status, body
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| AppError::BackendError(format!("Failed to parse response: {}", e)))
}

/// State shared by every vendor adapter
pub struct ProviderCore {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    key_required: bool,
    storage: Arc<dyn ImageStorage>,
}

impl ProviderCore {
    pub fn new(config: &ProviderConfig, storage: Arc<dyn ImageStorage>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let api_key_env = config
            .api_key_env
            .clone()
            .unwrap_or_else(|| default_api_key_env(config.kind).to_string());

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&api_key_env).ok())
            .filter(|key| !key.trim().is_empty());

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.kind).to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            name: config.name.clone(),
            client,
            base_url,
            api_key,
            api_key_env,
            key_required: config.kind != BackendKind::OpenaiCompatible,
            storage,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// The API key, or the error an adapter reports when it is missing
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key().ok_or_else(|| {
            AppError::BackendError(format!("{} environment variable not set", self.api_key_env))
        })
    }

    pub fn missing_key_reason(&self) -> Option<String> {
        if self.key_required && self.api_key.is_none() {
            Some(format!("{} environment variable not set", self.api_key_env))
        } else {
            None
        }
    }

    /// Send a request and decode its JSON body, honouring cancellation
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T> {
        cancellable(cancel, async move {
            let response = request.send().await?;
            read_json(response).await
        })
        .await
    }

    /// Download raw image bytes from a vendor URL
    pub async fn download(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        cancellable(cancel, async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AppError::BackendError(format!(
                    "Failed to download image: HTTP {}",
                    status
                )));
            }
            Ok(response.bytes().await?.to_vec())
        })
        .await
    }

    /// Hand image bytes to the storage collaborator
    pub async fn save_image(&self, data: &[u8], cancel: &CancellationToken) -> Result<GeneratedImage> {
        if data.is_empty() {
            return Err(AppError::BackendError("Image data is empty".to_string()));
        }

        let content_type = base64::sniff_content_type(data).unwrap_or("image/png");
        let location = cancellable(cancel, self.storage.put(data, content_type)).await?;

        debug!(backend = %self.name, location = %location, size = data.len(), "Stored generated image");

        Ok(GeneratedImage {
            id: Uuid::new_v4().to_string(),
            location,
            byte_size: data.len() as u64,
        })
    }

    /// Decode base64 image data and store it
    pub async fn save_base64(&self, encoded: &str, cancel: &CancellationToken) -> Result<GeneratedImage> {
        let data = base64::decode(encoded)?;
        self.save_image(&data, cancel).await
    }
}

fn default_api_key_env(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Freepik => "FREEPIK_API_KEY",
        BackendKind::GoogleImagen => "GOOGLE_API_KEY",
        BackendKind::LeonardoAi => "LEONARDO_API_KEY",
        BackendKind::OpenaiCompatible => "OPENAI_API_KEY",
    }
}

fn default_base_url(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Freepik => "https://api.freepik.com",
        BackendKind::GoogleImagen => "https://generativelanguage.googleapis.com",
        BackendKind::LeonardoAi => "https://cloud.leonardo.ai/api/rest/v1",
        BackendKind::OpenaiCompatible => "http://localhost:8000",
    }
}
