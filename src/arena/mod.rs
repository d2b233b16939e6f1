//! Arena service: turns generation results into pairs and votes into
//! statistics

pub mod autogen;

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::traits::GenerationRequest;
use crate::config::ArenaConfig;
use crate::error::{AppError, Result};
use crate::gateway::Orchestrator;
use crate::store::{
    ImagePair, KeyValueStore, PairStore, ProviderStats, Side, SideCounts, Vote, VoteLedger,
    WinningPair,
};

/// Images per generated pair
const PAIR_SIZE: u32 = 2;

/// A freshly generated pair and how it got there
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPair {
    #[serde(flatten)]
    pub pair: ImagePair,
    pub request_id: String,
    pub duration_ms: u64,
    /// False when the pair could not be written to the store
    pub persisted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateOutcome {
    pub success: bool,
    pub pair_id: String,
    pub winner: Side,
    pub recorded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_votes: usize,
    pub side_wins: SideCounts,
    pub total_pairs: usize,
}

#[derive(Clone)]
pub struct ArenaService {
    orchestrator: Arc<Orchestrator>,
    pairs: PairStore,
    votes: VoteLedger,
}

impl ArenaService {
    pub fn new(orchestrator: Arc<Orchestrator>, store: Arc<dyn KeyValueStore>, config: &ArenaConfig) -> Self {
        Self {
            orchestrator,
            pairs: PairStore::new(store.clone(), Duration::from_secs(config.viewed_ttl_secs)),
            votes: VoteLedger::new(
                store,
                config.vote_log_limit,
                Duration::from_secs(config.vote_record_ttl_secs),
            ),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Generate two images for `prompt` and store them as a pair. A pair
    /// that fails to persist is still returned.
    pub async fn generate_pair(&self, prompt: &str, cancel: &CancellationToken) -> Result<GeneratedPair> {
        let request = GenerationRequest::new(prompt)?;
        let started = Instant::now();

        let (provider, output) = self.orchestrator.execute(&request, PAIR_SIZE, cancel).await?;

        let mut images = output.images.into_iter();
        let (Some(left), Some(right)) = (images.next(), images.next()) else {
            return Err(AppError::Internal(format!(
                "{} returned fewer than {} images",
                provider, PAIR_SIZE
            )));
        };

        let pair = ImagePair::new(
            request.pair_id(),
            request.prompt(),
            provider,
            left.location,
            right.location,
        );

        let persisted = match self.pairs.store(&pair).await {
            Ok(()) => true,
            Err(e) => {
                error!(pair_id = %pair.pair_id, error = %e, "Failed to persist image pair");
                false
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            pair_id = %pair.pair_id,
            provider = %pair.provider,
            duration_ms,
            persisted,
            "Generated image pair"
        );

        Ok(GeneratedPair {
            pair,
            request_id: request.request_id().to_string(),
            duration_ms,
            persisted,
        })
    }

    pub async fn next_pair(&self, excluded: &[String], session_id: Option<&str>) -> Result<ImagePair> {
        self.pairs.get_random_unseen(excluded, session_id).await
    }

    /// Record a vote for `pair_id`. The pair must exist; a failure to write
    /// the vote is logged and reported as `recorded: false`.
    pub async fn rate(&self, pair_id: &str, winner: Side) -> Result<RateOutcome> {
        let pair = self.pairs.get_by_id(pair_id).await?;
        let vote = Vote::new(&pair.pair_id, winner, &pair.provider, &pair.prompt);

        let recorded = match self.votes.record(&vote).await {
            Ok(()) => true,
            Err(e) => {
                warn!(pair_id = %pair_id, error = %e, "Failed to record vote");
                false
            }
        };

        Ok(RateOutcome {
            success: true,
            pair_id: pair.pair_id,
            winner,
            recorded,
        })
    }

    pub async fn statistics(&self) -> Result<Statistics> {
        Ok(Statistics {
            total_votes: self.votes.total_votes().await?,
            side_wins: self.votes.side_win_counts().await?,
            total_pairs: self.pairs.count().await?,
        })
    }

    pub async fn leaderboard(&self) -> Result<Vec<ProviderStats>> {
        self.votes.provider_stats().await
    }

    pub async fn winners(&self, side: Side) -> Result<Vec<WinningPair>> {
        let votes = self.votes.recent_votes(None).await?;
        self.pairs.get_winning_pairs(side, &votes).await
    }
}
