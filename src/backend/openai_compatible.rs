//! Adapter for self-hosted or third-party servers speaking the OpenAI
//! images API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::provider::ProviderCore;
use crate::backend::traits::{GenerateOutput, GenerationRequest, ImageBackend};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::storage::ImageStorage;

pub struct OpenAiCompatibleBackend {
    core: ProviderCore,
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiGenerateRequest<'a> {
    prompt: &'a str,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    response_format: &'static str,
}

/// Servers disagree on whether images live under `data` or `images`
#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<ApiImageData>,
    #[serde(default)]
    data: Vec<ApiImageData>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    base64: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &ProviderConfig, storage: Arc<dyn ImageStorage>) -> Result<Self> {
        Ok(Self {
            core: ProviderCore::new(config, storage)?,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ImageBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        self.core.name()
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutput> {
        let body = ApiGenerateRequest {
            prompt: request.prompt(),
            n: count,
            model: self.model.as_deref(),
            response_format: "b64_json",
        };

        let mut http_request = self
            .core
            .client()
            .post(format!("{}/v1/images/generations", self.core.base_url()))
            .json(&body);
        if let Some(key) = self.core.api_key() {
            http_request = http_request.bearer_auth(key);
        }

        debug!(backend = %self.name(), endpoint = %self.core.base_url(), "Sending generate request");

        let response: ApiGenerateResponse = self.core.send_json(http_request, cancel).await?;

        let mut entries = response.images;
        entries.extend(response.data);

        let mut images = Vec::with_capacity(count as usize);
        for entry in entries.into_iter().take(count as usize) {
            let image = match (entry.b64_json.or(entry.base64), entry.url) {
                (Some(encoded), _) => self.core.save_base64(&encoded, cancel).await?,
                (None, Some(url)) => {
                    let data = self.core.download(&url, cancel).await?;
                    self.core.save_image(&data, cancel).await?
                }
                (None, None) => {
                    return Err(AppError::BackendError(
                        "Image entry has neither data nor URL".to_string(),
                    ))
                }
            };
            images.push(image);
        }

        let mut metadata = HashMap::new();
        if let Some(model) = response.model.or_else(|| self.model.clone()) {
            metadata.insert("model".to_string(), model);
        }

        Ok(GenerateOutput { images, metadata })
    }
}
