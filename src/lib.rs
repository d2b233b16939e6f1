//! Image Arena
//!
//! Generates pairs of images for a prompt through interchangeable vendor
//! backends with fallback, serves them for side-by-side comparison and
//! aggregates the votes cast on them.

pub mod api;
pub mod arena;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod storage;
pub mod store;

pub use error::{AppError, Result};

use std::sync::Arc;
use std::time::Instant;

use arena::ArenaService;
use gateway::Orchestrator;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub arena: ArenaService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Arc<config::Settings>, arena: ArenaService) -> Self {
        Self {
            settings,
            arena,
            started_at: Instant::now(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        self.arena.orchestrator()
    }
}
