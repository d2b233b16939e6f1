//! Provider orchestration: candidate selection, sequential fallback and
//! status bookkeeping

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::classify::{classify, FailureKind, ProviderError};
use crate::backend::traits::{BackendStatus, GenerateOutput, GenerationRequest, ImageBackend};
use crate::error::{AppError, Result};
use crate::gateway::selection::{SelectionStrategy, UniformRandom};

#[derive(Default)]
struct Registry {
    /// Registration order, used for status listings
    order: Vec<String>,
    backends: HashMap<String, Arc<dyn ImageBackend>>,
    statuses: HashMap<String, BackendStatus>,
}

/// Owns every registered backend and its status. The lock is held only to
/// snapshot or update and never across a backend call.
pub struct Orchestrator {
    registry: RwLock<Registry>,
    strategy: Arc<dyn SelectionStrategy>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(Arc::new(UniformRandom))
    }
}

impl Orchestrator {
    pub fn new(strategy: Arc<dyn SelectionStrategy>) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            strategy,
        }
    }

    /// Register a backend, replacing any earlier one with the same name
    pub fn register(&self, backend: Arc<dyn ImageBackend>) {
        let name = backend.name().to_string();
        let status = backend.initial_status();
        let mut registry = self.registry.write();
        if !registry.backends.contains_key(&name) {
            registry.order.push(name.clone());
        }
        registry.statuses.insert(name.clone(), status);
        registry.backends.insert(name.clone(), backend);
        debug!(backend = %name, "Backend added to orchestrator");
    }

    /// Snapshot of every status in registration order
    pub fn statuses(&self) -> Vec<BackendStatus> {
        let registry = self.registry.read();
        registry
            .order
            .iter()
            .filter_map(|name| registry.statuses.get(name).cloned())
            .collect()
    }

    pub fn status(&self, name: &str) -> Option<BackendStatus> {
        self.registry.read().statuses.get(name).cloned()
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.registry
            .read()
            .statuses
            .get(name)
            .map_or(false, BackendStatus::is_available)
    }

    pub fn available_count(&self) -> usize {
        self.registry
            .read()
            .statuses
            .values()
            .filter(|s| s.is_available())
            .count()
    }

    pub fn backend_count(&self) -> usize {
        self.registry.read().backends.len()
    }

    /// Order the currently available providers, skipping `excluded`
    pub fn select(&self, excluded: &HashSet<String>) -> Result<Vec<String>> {
        let mut candidates: Vec<BackendStatus> = {
            let registry = self.registry.read();
            registry
                .statuses
                .values()
                .filter(|s| s.is_available() && !excluded.contains(&s.name))
                .cloned()
                .collect()
        };

        if candidates.is_empty() {
            return Err(AppError::NoProvidersAvailable);
        }

        self.strategy.order(&mut candidates);
        let order: Vec<String> = candidates.into_iter().map(|s| s.name).collect();
        debug!(strategy = self.strategy.name(), candidates = ?order, "Selected candidates");
        Ok(order)
    }

    /// Record a failure and decide where to go next: the remaining
    /// available providers, freshly ordered, without the failed one.
    pub fn handle_provider_failure(&self, error: &ProviderError) -> Result<Vec<String>> {
        self.record_failure(error);
        let excluded = HashSet::from([error.provider.clone()]);
        self.select(&excluded)
    }

    /// Generate `count` images, falling back across providers. Each provider
    /// is tried at most once per call.
    pub async fn execute(
        &self,
        request: &GenerationRequest,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<(String, GenerateOutput)> {
        let mut attempted: HashSet<String> = HashSet::new();
        let mut candidates = self.select(&attempted)?;

        loop {
            let Some(name) = candidates.into_iter().next() else {
                return Err(AppError::NoProvidersAvailable);
            };
            let backend = self.registry.read().backends.get(&name).cloned();
            let Some(backend) = backend else {
                return Err(AppError::Internal(format!("backend '{}' vanished from registry", name)));
            };
            attempted.insert(name.clone());

            debug!(backend = %name, request_id = %request.request_id(), "Attempting generation");

            let failure = match backend.generate(request, count, cancel).await {
                Ok(output) if output.images.len() >= count as usize => {
                    self.record_success(&name);
                    info!(
                        backend = %name,
                        request_id = %request.request_id(),
                        images = output.images.len(),
                        "Generation succeeded"
                    );
                    return Ok((name, output));
                }
                Ok(output) => ProviderError {
                    provider: name.clone(),
                    kind: FailureKind::Unknown,
                    message: format!(
                        "returned {} of {} requested images",
                        output.images.len(),
                        count
                    ),
                },
                Err(AppError::Cancelled) => {
                    info!(backend = %name, request_id = %request.request_id(), "Generation cancelled");
                    return Err(AppError::Cancelled);
                }
                Err(AppError::Provider(error)) => error,
                Err(e) => classify(&name, &e),
            };

            warn!(
                backend = %name,
                request_id = %request.request_id(),
                kind = %failure.kind,
                error = %failure.message,
                "Generation attempt failed"
            );
            self.record_failure(&failure);

            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            candidates = match self.select(&attempted) {
                Ok(next) => next,
                Err(AppError::NoProvidersAvailable) => {
                    return Err(AppError::AllProvidersExhausted {
                        provider: failure.provider,
                        last_error: failure.message,
                    })
                }
                Err(e) => return Err(e),
            };
        }
    }

    /// Ask every backend for quota information and apply the results.
    /// Backends that can never be used are skipped.
    pub async fn refresh_quotas(&self) -> Vec<BackendStatus> {
        let backends: Vec<Arc<dyn ImageBackend>> = {
            let registry = self.registry.read();
            registry
                .order
                .iter()
                .filter_map(|name| registry.backends.get(name).cloned())
                .collect()
        };

        let mut results = Vec::with_capacity(backends.len());
        for backend in backends {
            if backend.unavailable_reason().is_some() {
                continue;
            }
            match backend.refresh_quota().await {
                Ok(quota) => results.push((backend.name().to_string(), quota)),
                Err(e) => warn!(backend = %backend.name(), error = %e, "Quota refresh failed"),
            }
        }

        {
            let mut registry = self.registry.write();
            for (name, quota) in results {
                if let Some(status) = registry.statuses.get_mut(&name) {
                    status.apply_quota_refresh(quota);
                    debug!(
                        backend = %name,
                        available = status.is_available(),
                        quota_exhausted = status.quota_exhausted,
                        "Quota refreshed"
                    );
                }
            }
        }

        self.statuses()
    }

    fn record_success(&self, name: &str) {
        if let Some(status) = self.registry.write().statuses.get_mut(name) {
            status.record_success(Utc::now());
        }
    }

    fn record_failure(&self, error: &ProviderError) {
        if let Some(status) = self.registry.write().statuses.get_mut(&error.provider) {
            status.record_failure(error);
        }
    }
}
