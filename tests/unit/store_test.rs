//! Unit tests for pair sampling, vote aggregation and the generation lock

use image_arena::store::{
    GenerationLock, ImagePair, KeyValueStore, MemoryStore, PairStore, Side, Vote, VoteLedger,
};
use image_arena::AppError;
use std::sync::Arc;
use std::time::Duration;

fn kv() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

fn pair(id: &str) -> ImagePair {
    ImagePair::new(id, format!("prompt {}", id), "freepik", format!("/images/{}-l.png", id), format!("/images/{}-r.png", id))
}

#[tokio::test]
async fn test_unseen_sampling_skips_excluded_and_viewed() {
    let store = kv();
    let pairs = PairStore::new(store.clone(), Duration::from_secs(86_400));
    for id in ["A", "B", "C"] {
        pairs.store(&pair(id)).await.unwrap();
    }

    // Session has already seen B
    store
        .set_add("session:s1:viewed", "B", Some(Duration::from_secs(86_400)))
        .await
        .unwrap();

    let excluded = vec!["A".to_string()];
    for _ in 0..10 {
        // Fresh sessions each time so C stays unseen
        store.delete("session:probe:viewed").await.unwrap();
        store
            .set_add("session:probe:viewed", "B", None)
            .await
            .unwrap();
        let picked = pairs
            .get_random_unseen(&excluded, Some("probe"))
            .await
            .unwrap();
        assert_eq!(picked.pair_id, "C");
    }

    let picked = pairs.get_random_unseen(&excluded, Some("s1")).await.unwrap();
    assert_eq!(picked.pair_id, "C");

    let result = pairs.get_random_unseen(&excluded, Some("s1")).await;
    assert!(matches!(result, Err(AppError::AllPairsViewed)));
}

#[tokio::test]
async fn test_viewed_set_is_recorded() {
    let store = kv();
    let pairs = PairStore::new(store.clone(), Duration::from_secs(86_400));
    pairs.store(&pair("A")).await.unwrap();
    pairs.store(&pair("B")).await.unwrap();

    let first = pairs.get_random_unseen(&[], Some("s")).await.unwrap();
    let second = pairs.get_random_unseen(&[], Some("s")).await.unwrap();
    assert_ne!(first.pair_id, second.pair_id);

    let viewed = store.set_members("session:s:viewed").await.unwrap();
    assert_eq!(viewed.len(), 2);
    assert!(matches!(
        pairs.get_random_unseen(&[], Some("s")).await,
        Err(AppError::AllPairsViewed)
    ));
    // Other sessions are unaffected
    assert!(pairs.get_random_unseen(&[], Some("other")).await.is_ok());
}

#[tokio::test]
async fn test_viewed_set_expires() {
    let store = kv();
    let pairs = PairStore::new(store.clone(), Duration::from_millis(30));
    pairs.store(&pair("A")).await.unwrap();

    pairs.get_random_unseen(&[], Some("s")).await.unwrap();
    assert!(pairs.get_random_unseen(&[], Some("s")).await.is_err());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(pairs.get_random_unseen(&[], Some("s")).await.unwrap().pair_id, "A");
}

#[tokio::test]
async fn test_side_counts_match_votes() {
    let ledger = VoteLedger::new(kv(), 10_000, Duration::from_secs(60));
    let total = 25;
    let left = 9;
    for i in 0..total {
        let side = if i < left { Side::Left } else { Side::Right };
        ledger
            .record(&Vote::new(format!("p{}", i), side, "leonardo-ai", "x"))
            .await
            .unwrap();
    }

    let counts = ledger.side_win_counts().await.unwrap();
    assert_eq!(counts.left, left as u64);
    assert_eq!(counts.right, (total - left) as u64);
    assert_eq!(ledger.total_votes().await.unwrap(), total);
}

#[tokio::test]
async fn test_concurrent_votes_are_not_lost() {
    let ledger = VoteLedger::new(kv(), 10_000, Duration::from_secs(60));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .record(&Vote::new(format!("p{}", i), Side::Left, "freepik", "x"))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.side_win_counts().await.unwrap().left, 50);
    assert_eq!(ledger.provider_stats().await.unwrap()[0].total_votes, 50);
}

#[tokio::test]
async fn test_winning_pairs_ranked_by_count() {
    let store = kv();
    let pairs = PairStore::new(store.clone(), Duration::from_secs(60));
    let ledger = VoteLedger::new(store, 10_000, Duration::from_secs(60));
    for id in ["A", "B", "C"] {
        pairs.store(&pair(id)).await.unwrap();
    }

    let votes = [
        ("A", Side::Left),
        ("B", Side::Left),
        ("B", Side::Left),
        ("C", Side::Left),
        ("A", Side::Right),
        ("gone", Side::Left),
    ];
    for (id, side) in votes {
        ledger.record(&Vote::new(id, side, "freepik", "x")).await.unwrap();
    }

    let log = ledger.recent_votes(None).await.unwrap();
    let winners = pairs.get_winning_pairs(Side::Left, &log).await.unwrap();
    let ranked: Vec<(&str, u64)> = winners
        .iter()
        .map(|w| (w.pair.pair_id.as_str(), w.vote_count))
        .collect();

    // B leads; A and C tie and C was voted on more recently
    assert_eq!(ranked, vec![("B", 2), ("C", 1), ("A", 1)]);

    let right = pairs.get_winning_pairs(Side::Right, &log).await.unwrap();
    assert_eq!(right.len(), 1);
    assert_eq!(right[0].pair.pair_id, "A");
}

#[tokio::test]
async fn test_concurrent_lock_acquire_single_winner() {
    let lock = GenerationLock::new(kv());

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.try_acquire("autogen", &format!("holder-{}", i), Duration::from_secs(60))
                    .await
            })
        })
        .collect();

    let mut acquired = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            acquired += 1;
        }
    }
    assert_eq!(acquired, 1);
}

#[tokio::test]
async fn test_lock_expires() {
    let lock = GenerationLock::new(kv());
    assert!(lock.try_acquire("autogen", "a", Duration::from_millis(20)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(lock.try_acquire("autogen", "b", Duration::from_millis(20)).await.unwrap());
    assert!(!lock.release("autogen", "a").await.unwrap());
}
