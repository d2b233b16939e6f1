//! Freepik text-to-image adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::provider::ProviderCore;
use crate::backend::traits::{GenerateOutput, GenerationRequest, ImageBackend};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::storage::ImageStorage;

const ASPECT_RATIO: &str = "square_1_1";

pub struct FreepikBackend {
    core: ProviderCore,
}

#[derive(Debug, Serialize)]
struct FreepikRequest<'a> {
    prompt: &'a str,
    num_images: u32,
    aspect_ratio: &'static str,
}

#[derive(Debug, Deserialize)]
struct FreepikResponse {
    #[serde(default)]
    data: Vec<FreepikImage>,
}

#[derive(Debug, Deserialize)]
struct FreepikImage {
    #[serde(default)]
    base64: String,
}

impl FreepikBackend {
    pub fn new(config: &ProviderConfig, storage: Arc<dyn ImageStorage>) -> Result<Self> {
        Ok(Self {
            core: ProviderCore::new(config, storage)?,
        })
    }
}

#[async_trait]
impl ImageBackend for FreepikBackend {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn unavailable_reason(&self) -> Option<String> {
        self.core.missing_key_reason()
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutput> {
        let api_key = self.core.require_api_key()?;

        info!(backend = %self.name(), request_id = %request.request_id(), count, "Starting Freepik generation");

        let body = FreepikRequest {
            prompt: request.prompt(),
            num_images: count,
            aspect_ratio: ASPECT_RATIO,
        };

        let http_request = self
            .core
            .client()
            .post(format!("{}/v1/ai/text-to-image", self.core.base_url()))
            .header("x-freepik-api-key", api_key)
            .json(&body);

        let response: FreepikResponse = self.core.send_json(http_request, cancel).await?;

        if response.data.is_empty() {
            return Err(AppError::BackendError(
                "No images returned from Freepik API".to_string(),
            ));
        }

        let mut images = Vec::with_capacity(count as usize);
        for (i, image) in response.data.iter().take(count as usize).enumerate() {
            if image.base64.is_empty() {
                return Err(AppError::BackendError(format!(
                    "Image {} has empty base64 data",
                    i + 1
                )));
            }
            images.push(self.core.save_base64(&image.base64, cancel).await?);
        }

        debug!(backend = %self.name(), images = images.len(), "Freepik generation finished");

        Ok(GenerateOutput {
            images,
            metadata: HashMap::from([
                ("model".to_string(), "classic-fast".to_string()),
                ("aspect_ratio".to_string(), ASPECT_RATIO.to_string()),
            ]),
        })
    }
}
