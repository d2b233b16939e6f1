//! Google Imagen adapter using the Generative Language `predict` endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backend::provider::ProviderCore;
use crate::backend::traits::{GenerateOutput, GenerationRequest, ImageBackend};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::storage::ImageStorage;

const DEFAULT_MODEL: &str = "imagen-4.0-generate-001";

pub struct GoogleImagenBackend {
    core: ProviderCore,
    model: String,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
}

impl GoogleImagenBackend {
    pub fn new(config: &ProviderConfig, storage: Arc<dyn ImageStorage>) -> Result<Self> {
        Ok(Self {
            core: ProviderCore::new(config, storage)?,
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl ImageBackend for GoogleImagenBackend {
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

        info!(backend = %self.name(), model = %self.model, count, "Starting Imagen generation");

        let body = PredictRequest {
            instances: vec![PredictInstance {
                prompt: request.prompt(),
            }],
            parameters: PredictParameters { sample_count: count },
        };

        let http_request = self
            .core
            .client()
            .post(format!(
                "{}/v1beta/models/{}:predict",
                self.core.base_url(),
                self.model
            ))
            .header("x-goog-api-key", api_key)
            .json(&body);

        let response: PredictResponse = self.core.send_json(http_request, cancel).await?;

        let encoded: Vec<String> = response
            .predictions
            .into_iter()
            .filter_map(|p| p.bytes_base64_encoded)
            .take(count as usize)
            .collect();

        if encoded.is_empty() {
            return Err(AppError::BackendError(
                "No images returned from Imagen API".to_string(),
            ));
        }

        let mut images = Vec::with_capacity(encoded.len());
        for data in &encoded {
            images.push(self.core.save_base64(data, cancel).await?);
        }

        Ok(GenerateOutput {
            images,
            metadata: HashMap::from([("model".to_string(), self.model.clone())]),
        })
    }
}
