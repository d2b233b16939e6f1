//! Shared key-value store and the records kept in it: image pairs, votes
//! and the cross-instance generation lock

pub mod lock;
pub mod memory;
pub mod pairs;
pub mod redis;
pub mod votes;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::Result;

pub use lock::GenerationLock;
pub use memory::MemoryStore;
pub use pairs::{ImagePair, PairStore, WinningPair};
pub use redis::RedisStore;
pub use votes::{ProviderStats, Side, SideCounts, Vote, VoteLedger};

/// Primitives the arena needs from its store. Every multi-client write
/// (counters, lock) goes through a store-side atomic operation.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomically set `key` only if it does not exist. Returns whether the
    /// value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically add `delta` to a hash field and return the new value
    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>>;

    /// Push to the head of a list and return the new length
    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize>;

    /// Keep only the elements in `[start, stop]` (inclusive)
    async fn list_trim(&self, key: &str, start: usize, stop: usize) -> Result<()>;

    /// Elements in `[start, stop]` (inclusive); `None` means to the end
    async fn list_range(&self, key: &str, start: usize, stop: Option<usize>) -> Result<Vec<String>>;

    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Add a member; when `ttl` is given the whole set's expiry is refreshed
    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()>;

    async fn set_members(&self, key: &str) -> Result<HashSet<String>>;

    async fn set_len(&self, key: &str) -> Result<usize>;
}

/// Connect to Redis when configured, otherwise fall back to the in-process store
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url, config.pool_size).await?;
            info!("Connected to Redis key-value store");
            Ok(Arc::new(store))
        }
        None => {
            info!("No Redis URL configured; using in-memory store (single instance only)");
            let store = Arc::new(MemoryStore::new());
            let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
            MemoryStore::spawn_sweeper(&store, interval);
            Ok(store)
        }
    }
}
