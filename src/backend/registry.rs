//! Builds vendor adapters from configuration

use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::freepik::FreepikBackend;
use crate::backend::google_imagen::GoogleImagenBackend;
use crate::backend::leonardo::LeonardoBackend;
use crate::backend::openai_compatible::OpenAiCompatibleBackend;
use crate::backend::traits::{BackendKind, ImageBackend};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::storage::ImageStorage;

/// Create the adapter for a single provider entry
pub fn build_backend(
    config: &ProviderConfig,
    storage: Arc<dyn ImageStorage>,
) -> Result<Arc<dyn ImageBackend>> {
    let backend: Arc<dyn ImageBackend> = match config.kind {
        BackendKind::Freepik => Arc::new(FreepikBackend::new(config, storage)?),
        BackendKind::GoogleImagen => Arc::new(GoogleImagenBackend::new(config, storage)?),
        BackendKind::LeonardoAi => Arc::new(LeonardoBackend::new(config, storage)?),
        BackendKind::OpenaiCompatible => Arc::new(OpenAiCompatibleBackend::new(config, storage)?),
    };

    match backend.unavailable_reason() {
        Some(reason) => warn!(backend = %config.name, kind = config.kind.as_str(), reason = %reason, "Backend registered as unavailable"),
        None => info!(backend = %config.name, kind = config.kind.as_str(), "Backend registered"),
    }

    Ok(backend)
}

/// Create adapters for every enabled provider entry
pub fn build_backends(
    configs: &[ProviderConfig],
    storage: Arc<dyn ImageStorage>,
) -> Result<Vec<Arc<dyn ImageBackend>>> {
    configs
        .iter()
        .filter(|c| c.enabled)
        .map(|c| build_backend(c, storage.clone()))
        .collect()
}
