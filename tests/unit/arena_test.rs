//! Unit tests for the arena service and background generation

#[path = "../common/mod.rs"]
mod common;

use async_trait::async_trait;
use common::{ByName, MockBackend, Outcome};
use image_arena::arena::{autogen::AutogenScheduler, ArenaService};
use image_arena::config::{ArenaConfig, AutogenConfig};
use image_arena::gateway::Orchestrator;
use image_arena::store::{GenerationLock, KeyValueStore, MemoryStore, Side};
use image_arena::{AppError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn arena_with(store: Arc<dyn KeyValueStore>, backends: Vec<Arc<MockBackend>>) -> ArenaService {
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(ByName)));
    for backend in backends {
        orchestrator.register(backend);
    }
    ArenaService::new(orchestrator, store, &ArenaConfig::default())
}

fn autogen_config() -> AutogenConfig {
    AutogenConfig {
        enabled: true,
        interval_secs: 3600,
        max_jitter_secs: 0,
        lock_ttl_secs: 60,
        prompts: vec!["a tiny robot".to_string()],
    }
}

/// Store whose writes always fail
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
        Err(AppError::Store("connection refused".to_string()))
    }
    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool> {
        Err(AppError::Store("connection refused".to_string()))
    }
    async fn delete(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
    async fn hash_increment(&self, _key: &str, _field: &str, _delta: i64) -> Result<i64> {
        Err(AppError::Store("connection refused".to_string()))
    }
    async fn hash_get_all(&self, _key: &str) -> Result<HashMap<String, i64>> {
        Ok(HashMap::new())
    }
    async fn list_push_front(&self, _key: &str, _value: &str) -> Result<usize> {
        Err(AppError::Store("connection refused".to_string()))
    }
    async fn list_trim(&self, _key: &str, _start: usize, _stop: usize) -> Result<()> {
        Ok(())
    }
    async fn list_range(&self, _key: &str, _start: usize, _stop: Option<usize>) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn list_len(&self, _key: &str) -> Result<usize> {
        Ok(0)
    }
    async fn set_add(&self, _key: &str, _member: &str, _ttl: Option<Duration>) -> Result<()> {
        Err(AppError::Store("connection refused".to_string()))
    }
    async fn set_members(&self, _key: &str) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }
    async fn set_len(&self, _key: &str) -> Result<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_generated_pair_is_stored_and_rated() {
    let arena = arena_with(Arc::new(MemoryStore::new()), vec![Arc::new(MockBackend::new("freepik"))]);

    let generated = arena
        .generate_pair("  a castle  ", &CancellationToken::new())
        .await
        .unwrap();
    assert!(generated.persisted);
    assert_eq!(generated.pair.prompt, "a castle");
    assert_eq!(generated.pair.provider, "freepik");
    assert_ne!(generated.pair.left_url, generated.pair.right_url);

    let outcome = arena.rate(&generated.pair.pair_id, Side::Right).await.unwrap();
    assert!(outcome.recorded);

    let stats = arena.statistics().await.unwrap();
    assert_eq!(stats.total_pairs, 1);
    assert_eq!(stats.total_votes, 1);
    assert_eq!(stats.side_wins.right, 1);
}

#[tokio::test]
async fn test_persistence_failure_is_reported_not_raised() {
    let arena = arena_with(Arc::new(BrokenStore), vec![Arc::new(MockBackend::new("freepik"))]);

    let generated = arena
        .generate_pair("a castle", &CancellationToken::new())
        .await
        .unwrap();
    assert!(!generated.persisted);
}

#[tokio::test]
async fn test_generation_falls_back_to_next_provider() {
    let first = Arc::new(MockBackend::with_outcomes("a", vec![Outcome::Fail("insufficient credits")]));
    let second = Arc::new(MockBackend::new("b"));
    let arena = arena_with(Arc::new(MemoryStore::new()), vec![first.clone(), second.clone()]);

    let generated = arena
        .generate_pair("a castle", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(generated.pair.provider, "b");
    assert!(arena.orchestrator().status("a").unwrap().quota_exhausted);
}

#[tokio::test]
async fn test_autogen_cycle_generates_one_pair() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockBackend::new("freepik"));
    let arena = arena_with(store.clone(), vec![backend.clone()]);

    let scheduler = AutogenScheduler::new(arena.clone(), GenerationLock::new(store.clone()), autogen_config());
    assert!(scheduler.run_once().await.unwrap());

    assert_eq!(backend.calls(), 1);
    assert_eq!(arena.statistics().await.unwrap().total_pairs, 1);
    // Lock released after the cycle
    assert_eq!(store.get("lock:autogen").await.unwrap(), None);
}

#[tokio::test]
async fn test_autogen_never_picks_blank_prompt() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockBackend::new("freepik"));
    let arena = arena_with(store.clone(), vec![backend.clone()]);

    let mut config = autogen_config();
    config.prompts = vec!["   ".to_string(), "a tiny robot".to_string(), String::new()];
    let scheduler = AutogenScheduler::new(arena.clone(), GenerationLock::new(store), config);

    for _ in 0..10 {
        assert!(scheduler.run_once().await.unwrap());
    }
    assert_eq!(backend.calls(), 10);
    assert_eq!(arena.statistics().await.unwrap().total_pairs, 10);
}

#[tokio::test]
async fn test_autogen_skips_when_lock_held() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockBackend::new("freepik"));
    let arena = arena_with(store.clone(), vec![backend.clone()]);

    let lock = GenerationLock::new(store.clone());
    assert!(lock
        .try_acquire("autogen", "other-instance", Duration::from_secs(60))
        .await
        .unwrap());

    let scheduler = AutogenScheduler::new(arena, lock, autogen_config());
    assert!(!scheduler.run_once().await.unwrap());
    assert_eq!(backend.calls(), 0);
    assert_eq!(
        store.get("lock:autogen").await.unwrap().as_deref(),
        Some("other-instance")
    );
}

#[tokio::test]
async fn test_autogen_releases_lock_after_failure() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockBackend::with_outcomes("a", vec![Outcome::Fail("boom")]));
    let arena = arena_with(store.clone(), vec![backend]);

    let scheduler = AutogenScheduler::new(arena, GenerationLock::new(store.clone()), autogen_config());
    assert!(scheduler.run_once().await.is_err());
    assert_eq!(store.get("lock:autogen").await.unwrap(), None);
}

#[tokio::test]
async fn test_autogen_background_loop_start_stop() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let arena = arena_with(store.clone(), vec![Arc::new(MockBackend::new("freepik"))]);

    let scheduler = AutogenScheduler::new(arena.clone(), GenerationLock::new(store), autogen_config());
    scheduler.start().await;

    let mut pairs = 0;
    for _ in 0..50 {
        pairs = arena.statistics().await.unwrap().total_pairs;
        if pairs > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pairs, 1);

    tokio::time::timeout(Duration::from_secs(2), scheduler.stop())
        .await
        .unwrap();
}
