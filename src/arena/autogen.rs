//! Background pair generation. Instances share the `autogen` lock so only
//! one of them generates per cycle.

use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::arena::ArenaService;
use crate::config::AutogenConfig;
use crate::error::{AppError, Result};
use crate::store::GenerationLock;

const LOCK_NAME: &str = "autogen";

#[derive(Clone)]
struct CycleRunner {
    arena: ArenaService,
    lock: GenerationLock,
    config: AutogenConfig,
    holder_id: String,
}

impl CycleRunner {
    async fn run_once(&self, cancel: &CancellationToken) -> Result<bool> {
        let ttl = Duration::from_secs(self.config.lock_ttl_secs);
        if !self.lock.try_acquire(LOCK_NAME, &self.holder_id, ttl).await? {
            debug!(holder = %self.holder_id, "Autogen lock held elsewhere, skipping cycle");
            return Ok(false);
        }

        let prompt = self.config.prompts.choose(&mut rand::thread_rng()).cloned();
        let result = match prompt {
            Some(prompt) => self.arena.generate_pair(&prompt, cancel).await.map(|generated| {
                info!(
                    pair_id = %generated.pair.pair_id,
                    provider = %generated.pair.provider,
                    "Background pair generated"
                );
            }),
            None => Err(AppError::Validation("no autogen prompts configured".to_string())),
        };

        if let Err(e) = self.lock.release(LOCK_NAME, &self.holder_id).await {
            warn!(error = %e, "Failed to release autogen lock; it will expire on its own");
        }

        result.map(|()| true)
    }
}

/// Periodic generator with an explicit start/stop lifecycle
pub struct AutogenScheduler {
    runner: CycleRunner,
    shutdown: CancellationToken,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl AutogenScheduler {
    /// Blank prompts are dropped; a cycle only ever picks a usable one.
    pub fn new(arena: ArenaService, lock: GenerationLock, mut config: AutogenConfig) -> Self {
        config.prompts.retain(|prompt| !prompt.trim().is_empty());
        Self {
            runner: CycleRunner {
                arena,
                lock,
                config,
                holder_id: Uuid::new_v4().to_string(),
            },
            shutdown: CancellationToken::new(),
            task: RwLock::new(None),
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.runner.holder_id
    }

    /// Run a single cycle now. Returns whether this instance held the lock.
    pub async fn run_once(&self) -> Result<bool> {
        self.runner.run_once(&self.shutdown).await
    }

    /// Start the background task
    pub async fn start(&self) {
        let runner = self.runner.clone();
        let shutdown = self.shutdown.clone();
        let interval = Duration::from_secs(runner.config.interval_secs);
        let max_jitter_ms = runner.config.max_jitter_secs * 1000;

        let handle = tokio::spawn(async move {
            loop {
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms));
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(jitter) => {}
                }

                match runner.run_once(&shutdown).await {
                    Ok(true) => debug!("Autogen cycle completed"),
                    Ok(false) => {}
                    Err(AppError::Cancelled) => break,
                    Err(e) => error!(error = %e, "Autogen cycle failed"),
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Autogen loop exited");
        });

        *self.task.write().await = Some(handle);
        info!(
            interval_secs = self.runner.config.interval_secs,
            max_jitter_secs = self.runner.config.max_jitter_secs,
            "Started autogen background task"
        );
    }

    /// Signal the loop to stop and wait for it to finish
    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.task.write().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Autogen task ended abnormally");
            }
            info!("Stopped autogen background task");
        }
    }
}
