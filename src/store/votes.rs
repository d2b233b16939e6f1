//! Vote recording and aggregate statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::store::KeyValueStore;

const RECENT_VOTES_KEY: &str = "votes:recent";
const SIDE_WINS_KEY: &str = "stats:side_wins";
const PROVIDER_VOTES_KEY: &str = "stats:provider_votes";
const PROVIDER_WINS_KEY: &str = "stats:provider_wins";
const PROVIDER_LOSSES_KEY: &str = "stats:provider_losses";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(AppError::Validation(format!(
                "winner must be 'left' or 'right', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub pair_id: String,
    pub winner: Side,
    pub provider: String,
    pub prompt: String,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(
        pair_id: impl Into<String>,
        winner: Side,
        provider: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            pair_id: pair_id.into(),
            winner,
            provider: provider.into(),
            prompt: prompt.into(),
            cast_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SideCounts {
    pub left: u64,
    pub right: u64,
}

impl SideCounts {
    pub fn total(&self) -> u64 {
        self.left + self.right
    }

    fn add(&mut self, side: Side, count: u64) {
        match side {
            Side::Left => self.left += count,
            Side::Right => self.right += count,
        }
    }
}

/// Leaderboard row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStats {
    pub provider: String,
    pub total_votes: u64,
    pub wins: SideCounts,
    pub losses: SideCounts,
    /// Wins on either side as a percentage of `total_votes`; 0 without votes
    pub win_rate: f64,
}

impl ProviderStats {
    fn compute_win_rate(&mut self) {
        self.win_rate = if self.total_votes == 0 {
            0.0
        } else {
            self.wins.total() as f64 / self.total_votes as f64 * 100.0
        };
    }
}

/// Append-only vote log plus counters. Counter updates are store-side
/// increments so concurrent instances never lose a vote.
#[derive(Clone)]
pub struct VoteLedger {
    store: Arc<dyn KeyValueStore>,
    log_limit: usize,
    record_ttl: Duration,
}

fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}

impl VoteLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, log_limit: usize, record_ttl: Duration) -> Self {
        Self {
            store,
            log_limit,
            record_ttl,
        }
    }

    pub async fn record(&self, vote: &Vote) -> Result<()> {
        let json = serde_json::to_string(vote)?;

        self.store
            .set(&format!("vote:{}", vote.pair_id), &json, Some(self.record_ttl))
            .await?;

        let len = self.store.list_push_front(RECENT_VOTES_KEY, &json).await?;
        if len > self.log_limit {
            self.store
                .list_trim(RECENT_VOTES_KEY, 0, self.log_limit.saturating_sub(1))
                .await?;
        }

        let winner = vote.winner;
        let loser = winner.opposite();
        self.store
            .hash_increment(SIDE_WINS_KEY, winner.as_str(), 1)
            .await?;
        self.store
            .hash_increment(PROVIDER_VOTES_KEY, &vote.provider, 1)
            .await?;
        self.store
            .hash_increment(PROVIDER_WINS_KEY, &format!("{}:{}", vote.provider, winner), 1)
            .await?;
        self.store
            .hash_increment(PROVIDER_LOSSES_KEY, &format!("{}:{}", vote.provider, loser), 1)
            .await?;

        debug!(pair_id = %vote.pair_id, winner = %winner, provider = %vote.provider, "Recorded vote");
        Ok(())
    }

    /// Size of the bounded vote log
    pub async fn total_votes(&self) -> Result<usize> {
        self.store.list_len(RECENT_VOTES_KEY).await
    }

    pub async fn side_win_counts(&self) -> Result<SideCounts> {
        let hash = self.store.hash_get_all(SIDE_WINS_KEY).await?;
        Ok(SideCounts {
            left: hash.get("left").copied().map_or(0, to_count),
            right: hash.get("right").copied().map_or(0, to_count),
        })
    }

    /// Newest first; `None` returns the whole log
    pub async fn recent_votes(&self, limit: Option<usize>) -> Result<Vec<Vote>> {
        let stop = match limit {
            Some(0) => return Ok(Vec::new()),
            Some(limit) => Some(limit - 1),
            None => None,
        };

        let raw = self.store.list_range(RECENT_VOTES_KEY, 0, stop).await?;
        Ok(raw
            .iter()
            .filter_map(|json| match serde_json::from_str::<Vote>(json) {
                Ok(vote) => Some(vote),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable vote log entry");
                    None
                }
            })
            .collect())
    }

    /// Per-provider totals, most voted first
    pub async fn provider_stats(&self) -> Result<Vec<ProviderStats>> {
        let totals = self.store.hash_get_all(PROVIDER_VOTES_KEY).await?;
        let wins = self.store.hash_get_all(PROVIDER_WINS_KEY).await?;
        let losses = self.store.hash_get_all(PROVIDER_LOSSES_KEY).await?;

        let mut stats: HashMap<String, ProviderStats> = HashMap::new();
        for (provider, total) in &totals {
            stats_row(&mut stats, provider).total_votes = to_count(*total);
        }
        for (field, count) in &wins {
            if let Some((provider, side)) = split_side_field(field) {
                stats_row(&mut stats, provider).wins.add(side, to_count(*count));
            }
        }
        for (field, count) in &losses {
            if let Some((provider, side)) = split_side_field(field) {
                stats_row(&mut stats, provider).losses.add(side, to_count(*count));
            }
        }

        let mut rows: Vec<ProviderStats> = stats.into_values().collect();
        for row in &mut rows {
            row.compute_win_rate();
        }
        rows.sort_by(|a, b| {
            b.total_votes
                .cmp(&a.total_votes)
                .then_with(|| a.provider.cmp(&b.provider))
        });
        Ok(rows)
    }
}

fn stats_row<'a>(stats: &'a mut HashMap<String, ProviderStats>, provider: &str) -> &'a mut ProviderStats {
    stats
        .entry(provider.to_string())
        .or_insert_with(|| ProviderStats {
            provider: provider.to_string(),
            ..Default::default()
        })
}

/// Split a `provider:side` counter field
fn split_side_field(field: &str) -> Option<(&str, Side)> {
    let (provider, side) = field.rsplit_once(':')?;
    side.parse().ok().map(|side| (provider, side))
}
