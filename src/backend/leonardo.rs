//! Leonardo AI adapter. Generation is asynchronous: a job is started and
//! then polled until it completes, fails or the attempt budget runs out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::provider::{cancellable_sleep, ProviderCore};
use crate::backend::traits::{
    GenerateOutput, GeneratedImage, GenerationRequest, ImageBackend, QuotaInfo,
};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::storage::ImageStorage;

/// Leonardo Creative
const DEFAULT_MODEL: &str = "6bef9f1b-29cb-40c7-b9df-32b51c1f67d3";
const IMAGE_SIZE: u32 = 1024;

pub struct LeonardoBackend {
    core: ProviderCore,
    model: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    height: u32,
    model_id: &'a str,
    prompt: &'a str,
    width: u32,
    #[serde(rename = "num_images")]
    num_images: u32,
    #[serde(rename = "guidance_scale")]
    guidance_scale: u32,
    #[serde(rename = "num_inference_steps")]
    num_inference_steps: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    sd_generation_job: GenerationJob,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationJob {
    generation_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    generations_by_pk: Option<Generation>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    status: String,
    #[serde(default)]
    generated_images: Vec<LeonardoImage>,
}

#[derive(Debug, Deserialize)]
struct LeonardoImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    user_details: Vec<UserDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDetail {
    #[serde(default)]
    api_subscription_tokens: i64,
    #[serde(default)]
    api_paid_tokens: Option<i64>,
    #[serde(default)]
    api_plan_token_renewal_date: Option<String>,
}

impl LeonardoBackend {
    pub fn new(config: &ProviderConfig, storage: Arc<dyn ImageStorage>) -> Result<Self> {
        Ok(Self {
            core: ProviderCore::new(config, storage)?,
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts,
        })
    }

    async fn start_generation(
        &self,
        api_key: &str,
        prompt: &str,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let body = StartRequest {
            height: IMAGE_SIZE,
            model_id: &self.model,
            prompt,
            width: IMAGE_SIZE,
            num_images: count,
            guidance_scale: 7,
            num_inference_steps: 15,
        };

        let http_request = self
            .core
            .client()
            .post(format!("{}/generations", self.core.base_url()))
            .bearer_auth(api_key)
            .json(&body);

        let response: StartResponse = self.core.send_json(http_request, cancel).await?;
        Ok(response.sd_generation_job.generation_id)
    }

    /// Poll until the job settles. Cancellation is checked on every attempt
    /// and during every sleep.
    async fn poll_for_completion(
        &self,
        api_key: &str,
        generation_id: &str,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedImage>> {
        let url = format!("{}/generations/{}", self.core.base_url(), generation_id);

        for attempt in 1..=self.max_poll_attempts {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let http_request = self.core.client().get(&url).bearer_auth(api_key);
            let response: StatusResponse = self.core.send_json(http_request, cancel).await?;
            let generation = response.generations_by_pk.ok_or_else(|| {
                AppError::BackendError(format!("Generation {} not found", generation_id))
            })?;

            match generation.status.as_str() {
                "COMPLETE" => {
                    let mut images = Vec::new();
                    for (i, image) in generation.generated_images.iter().take(count as usize).enumerate() {
                        let data = self.core.download(&image.url, cancel).await.map_err(|e| match e {
                            AppError::Cancelled => e,
                            other => AppError::BackendError(format!(
                                "Failed to save image {}: {}",
                                i + 1,
                                other
                            )),
                        })?;
                        images.push(self.core.save_image(&data, cancel).await?);
                    }
                    return Ok(images);
                }
                "FAILED" => {
                    return Err(AppError::BackendError(format!(
                        "Generation {} failed",
                        generation_id
                    )));
                }
                status => {
                    debug!(backend = %self.name(), generation_id, attempt, status, "Generation still pending");
                    cancellable_sleep(cancel, self.poll_interval).await?;
                }
            }
        }

        Err(AppError::GenerationTimeout(format!(
            "generation {} did not finish after {} attempts",
            generation_id, self.max_poll_attempts
        )))
    }
}

#[async_trait]
impl ImageBackend for LeonardoBackend {
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

        info!(backend = %self.name(), request_id = %request.request_id(), count, "Starting Leonardo generation");

        let generation_id = self
            .start_generation(api_key, request.prompt(), count, cancel)
            .await?;
        let images = self
            .poll_for_completion(api_key, &generation_id, count, cancel)
            .await?;

        Ok(GenerateOutput {
            images,
            metadata: HashMap::from([
                ("model_id".to_string(), self.model.clone()),
                ("generation_id".to_string(), generation_id),
            ]),
        })
    }

    async fn refresh_quota(&self) -> Result<Option<QuotaInfo>> {
        let api_key = self.core.require_api_key()?;

        let http_request = self
            .core
            .client()
            .get(format!("{}/me", self.core.base_url()))
            .bearer_auth(api_key);

        let response: MeResponse = self
            .core
            .send_json(http_request, &CancellationToken::new())
            .await?;

        let detail = response.user_details.into_iter().next().ok_or_else(|| {
            AppError::BackendError("No user details in response".to_string())
        })?;

        let renewal_at = detail
            .api_plan_token_renewal_date
            .as_deref()
            .and_then(|raw| match DateTime::parse_from_rfc3339(raw) {
                Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                Err(e) => {
                    warn!(backend = %self.name(), error = %e, "Unparseable token renewal date");
                    None
                }
            });

        let quota = QuotaInfo {
            remaining: detail.api_subscription_tokens,
            total: detail.api_subscription_tokens + detail.api_paid_tokens.unwrap_or(0),
            renewal_at,
            updated_at: Utc::now(),
        };

        info!(backend = %self.name(), remaining = quota.remaining, "Quota refreshed");

        Ok(Some(quota))
    }
}
