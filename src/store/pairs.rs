//! Pair persistence and unseen-pair sampling

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::store::votes::{Side, Vote};
use crate::store::KeyValueStore;

const PAIRS_INDEX_KEY: &str = "pairs:index";

fn pair_key(pair_id: &str) -> String {
    format!("pair:{}", pair_id)
}

fn viewed_key(session_id: &str) -> String {
    format!("session:{}:viewed", session_id)
}

/// Two images generated by one provider for one prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePair {
    pub pair_id: String,
    pub prompt: String,
    pub provider: String,
    pub left_url: String,
    pub right_url: String,
    pub created_at: DateTime<Utc>,
}

impl ImagePair {
    pub fn new(
        pair_id: impl Into<String>,
        prompt: impl Into<String>,
        provider: impl Into<String>,
        left_url: impl Into<String>,
        right_url: impl Into<String>,
    ) -> Self {
        Self {
            pair_id: pair_id.into(),
            prompt: prompt.into(),
            provider: provider.into(),
            left_url: left_url.into(),
            right_url: right_url.into(),
            created_at: Utc::now(),
        }
    }
}

/// A pair together with how often one of its sides won
#[derive(Debug, Clone, Serialize)]
pub struct WinningPair {
    #[serde(flatten)]
    pub pair: ImagePair,
    pub vote_count: u64,
}

#[derive(Clone)]
pub struct PairStore {
    store: Arc<dyn KeyValueStore>,
    viewed_ttl: Duration,
}

impl PairStore {
    pub fn new(store: Arc<dyn KeyValueStore>, viewed_ttl: Duration) -> Self {
        Self { store, viewed_ttl }
    }

    /// Persist a pair. Writing the same pair id twice leaves one entry.
    pub async fn store(&self, pair: &ImagePair) -> Result<()> {
        let json = serde_json::to_string(pair)?;
        self.store.set(&pair_key(&pair.pair_id), &json, None).await?;
        self.store.set_add(PAIRS_INDEX_KEY, &pair.pair_id, None).await?;
        debug!(pair_id = %pair.pair_id, provider = %pair.provider, "Stored image pair");
        Ok(())
    }

    pub async fn get_by_id(&self, pair_id: &str) -> Result<ImagePair> {
        let json = self
            .store
            .get(&pair_key(pair_id))
            .await?
            .ok_or_else(|| AppError::PairNotFound(pair_id.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Number of pairs ever stored
    pub async fn count(&self) -> Result<usize> {
        self.store.set_len(PAIRS_INDEX_KEY).await
    }

    /// Pick a pair the caller has not excluded and, when a session is given,
    /// that the session has not been shown yet. The pick is recorded in the
    /// session's viewed set.
    pub async fn get_random_unseen(
        &self,
        excluded: &[String],
        session_id: Option<&str>,
    ) -> Result<ImagePair> {
        let index = self.store.set_members(PAIRS_INDEX_KEY).await?;
        if index.is_empty() {
            return Err(AppError::NoPairsYet);
        }

        let viewed = match session_id {
            Some(sid) => self.store.set_members(&viewed_key(sid)).await?,
            None => Default::default(),
        };

        let mut candidates: Vec<&String> = index
            .iter()
            .filter(|id| !viewed.contains(*id) && !excluded.contains(*id))
            .collect();
        // Sorted so the pick depends on the RNG alone, not on hash order
        candidates.sort();

        loop {
            let chosen = match candidates.choose(&mut rand::thread_rng()) {
                Some(id) => (*id).clone(),
                None => return Err(AppError::AllPairsViewed),
            };

            match self.get_by_id(&chosen).await {
                Ok(pair) => {
                    if let Some(sid) = session_id {
                        self.store
                            .set_add(&viewed_key(sid), &pair.pair_id, Some(self.viewed_ttl))
                            .await?;
                    }
                    return Ok(pair);
                }
                Err(AppError::PairNotFound(_)) => {
                    warn!(pair_id = %chosen, "Indexed pair has no record, skipping");
                    candidates.retain(|id| **id != chosen);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pairs ranked by wins for `side`. `votes` is the vote log, newest
    /// first; equal counts keep the order of each pair's most recent vote.
    pub async fn get_winning_pairs(&self, side: Side, votes: &[Vote]) -> Result<Vec<WinningPair>> {
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for vote in votes.iter().filter(|v| v.winner == side) {
            let count = counts.entry(vote.pair_id.as_str()).or_insert(0);
            if *count == 0 {
                order.push(vote.pair_id.as_str());
            }
            *count += 1;
        }

        let mut winners = Vec::with_capacity(order.len());
        for pair_id in order {
            match self.get_by_id(pair_id).await {
                Ok(pair) => winners.push(WinningPair {
                    pair,
                    vote_count: counts[pair_id],
                }),
                Err(AppError::PairNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        winners.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
        Ok(winners)
    }
}
