//! Gateway module - provider selection and fallback orchestration

pub mod orchestrator;
pub mod selection;

pub use orchestrator::Orchestrator;
pub use selection::{build_strategy, LeastErrorsFirst, SelectionStrategy, UniformRandom};
