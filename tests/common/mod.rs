//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use image_arena::backend::traits::{
    BackendStatus, GenerateOutput, GeneratedImage, GenerationRequest, ImageBackend, QuotaInfo,
};
use image_arena::gateway::SelectionStrategy;
use image_arena::{AppError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// What a mock backend does on its next call
#[derive(Debug, Clone)]
pub enum Outcome {
    Images(usize),
    Fail(&'static str),
    Cancelled,
}

pub struct MockBackend {
    name: String,
    outcomes: Mutex<VecDeque<Outcome>>,
    calls: AtomicUsize,
    unavailable: Option<String>,
    quota: Mutex<Option<QuotaInfo>>,
}

impl MockBackend {
    /// Succeeds with the requested number of images unless scripted otherwise
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcomes: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            unavailable: None,
            quota: Mutex::new(None),
        }
    }

    pub fn with_outcomes(name: &str, outcomes: Vec<Outcome>) -> Self {
        let backend = Self::new(name);
        *backend.outcomes.lock() = outcomes.into();
        backend
    }

    pub fn missing_key(name: &str) -> Self {
        Self {
            unavailable: Some("MOCK_API_KEY environment variable not set".to_string()),
            ..Self::new(name)
        }
    }

    pub fn set_quota(&self, remaining: i64, total: i64) {
        *self.quota.lock() = Some(QuotaInfo {
            remaining,
            total,
            renewal_at: None,
            updated_at: Utc::now(),
        });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn images(count: usize) -> Vec<GeneratedImage> {
    (0..count)
        .map(|i| GeneratedImage {
            id: format!("img-{}", i),
            location: format!("/images/img-{}.png", i),
            byte_size: 68,
        })
        .collect()
}

#[async_trait]
impl ImageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn unavailable_reason(&self) -> Option<String> {
        self.unavailable.clone()
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
        count: u32,
        _cancel: &CancellationToken,
    ) -> Result<GenerateOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(Outcome::Images(count as usize));

        match outcome {
            Outcome::Images(n) => Ok(GenerateOutput {
                images: images(n),
                metadata: HashMap::new(),
            }),
            Outcome::Fail(message) => Err(AppError::BackendError(message.to_string())),
            Outcome::Cancelled => Err(AppError::Cancelled),
        }
    }

    async fn refresh_quota(&self) -> Result<Option<QuotaInfo>> {
        Ok(self.quota.lock().clone())
    }
}

/// Orders candidates by name so tests know who is tried first
pub struct ByName;

impl SelectionStrategy for ByName {
    fn name(&self) -> &'static str {
        "by_name"
    }

    fn order(&self, candidates: &mut [BackendStatus]) {
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
    }
}
