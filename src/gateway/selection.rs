//! Strategies for ordering candidate providers

use rand::seq::SliceRandom;
use std::sync::Arc;

use crate::backend::traits::BackendStatus;
use crate::config::SelectionKind;

/// Orders the available candidates for one selection round. The first
/// entry is attempted first.
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn order(&self, candidates: &mut [BackendStatus]);
}

/// Every permutation equally likely
#[derive(Debug, Default)]
pub struct UniformRandom;

impl SelectionStrategy for UniformRandom {
    fn name(&self) -> &'static str {
        "uniform_random"
    }

    fn order(&self, candidates: &mut [BackendStatus]) {
        candidates.shuffle(&mut rand::thread_rng());
    }
}

/// Fewest consecutive errors first; ties broken randomly
#[derive(Debug, Default)]
pub struct LeastErrorsFirst;

impl SelectionStrategy for LeastErrorsFirst {
    fn name(&self) -> &'static str {
        "least_errors_first"
    }

    fn order(&self, candidates: &mut [BackendStatus]) {
        candidates.shuffle(&mut rand::thread_rng());
        candidates.sort_by_key(|status| status.consecutive_error_count);
    }
}

pub fn build_strategy(kind: SelectionKind) -> Arc<dyn SelectionStrategy> {
    match kind {
        SelectionKind::UniformRandom => Arc::new(UniformRandom),
        SelectionKind::LeastErrorsFirst => Arc::new(LeastErrorsFirst),
    }
}
