//! In-process key-value store. Each key is guarded by its DashMap shard, so
//! single-key operations are atomic with respect to each other.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::store::KeyValueStore;

#[derive(Debug)]
enum Value {
    Str(String),
    Hash(HashMap<String, i64>),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| Instant::now() >= at)
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::Store(format!("WRONGTYPE operation against key '{}' holding another kind of value", key))
}

/// Key-value store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the live entry for `key`, creating it from `empty`
    /// when missing or expired. The shard lock is held for the duration.
    fn update<T>(
        &self,
        key: &str,
        empty: fn() -> Value,
        f: impl FnOnce(&mut Entry) -> Result<T>,
    ) -> Result<T> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(empty(), None));
        if entry.is_expired() {
            *entry = Entry::new(empty(), None);
        }
        f(&mut entry)
    }

    /// Read the live value for `key`. An expired entry is removed on the way.
    fn read<T>(&self, key: &str, f: impl FnOnce(&Value) -> Result<T>) -> Result<Option<T>> {
        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired() => return f(&entry.value).map(Some),
            Some(_) => {}
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    /// Drop every expired key and return how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    /// Number of keys held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start a background task that purges expired keys every `interval`.
    /// The task ends once the store is dropped.
    pub fn spawn_sweeper(store: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "Purged expired keys");
                }
            }
        })
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(key, |value| match value {
            Value::Str(s) => Ok(s.clone()),
            _ => Err(wrong_type(key)),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.entries
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string()), ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let fresh = || Entry::new(Value::Str(value.to_string()), Some(ttl));
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(fresh());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(fresh());
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove(key)
            .map_or(false, |(_, entry)| !entry.is_expired()))
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.update(key, || Value::Hash(HashMap::new()), |entry| match &mut entry.value {
            Value::Hash(hash) => {
                let counter = hash.entry(field.to_string()).or_insert(0);
                *counter += delta;
                Ok(*counter)
            }
            _ => Err(wrong_type(key)),
        })
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>> {
        let hash = self.read(key, |value| match value {
            Value::Hash(hash) => Ok(hash.clone()),
            _ => Err(wrong_type(key)),
        })?;
        Ok(hash.unwrap_or_default())
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize> {
        self.update(key, || Value::List(VecDeque::new()), |entry| match &mut entry.value {
            Value::List(list) => {
                list.push_front(value.to_string());
                Ok(list.len())
            }
            _ => Err(wrong_type(key)),
        })
    }

    async fn list_trim(&self, key: &str, start: usize, stop: usize) -> Result<()> {
        if self.read(key, |_| Ok(()))?.is_none() {
            return Ok(());
        }
        self.update(key, || Value::List(VecDeque::new()), |entry| match &mut entry.value {
            Value::List(list) => {
                let kept: VecDeque<String> = list
                    .iter()
                    .skip(start)
                    .take((stop + 1).saturating_sub(start))
                    .cloned()
                    .collect();
                *list = kept;
                Ok(())
            }
            _ => Err(wrong_type(key)),
        })
    }

    async fn list_range(&self, key: &str, start: usize, stop: Option<usize>) -> Result<Vec<String>> {
        let items = self.read(key, |value| match value {
            Value::List(list) => {
                let take = match stop {
                    Some(stop) => (stop + 1).saturating_sub(start),
                    None => usize::MAX,
                };
                Ok(list.iter().skip(start).take(take).cloned().collect())
            }
            _ => Err(wrong_type(key)),
        })?;
        Ok(items.unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let len = self.read(key, |value| match value {
            Value::List(list) => Ok(list.len()),
            _ => Err(wrong_type(key)),
        })?;
        Ok(len.unwrap_or(0))
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()> {
        self.update(key, || Value::Set(HashSet::new()), |entry| {
            match &mut entry.value {
                Value::Set(set) => {
                    set.insert(member.to_string());
                }
                _ => return Err(wrong_type(key)),
            }
            if let Some(ttl) = ttl {
                entry.expires_at = Some(Instant::now() + ttl);
            }
            Ok(())
        })
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>> {
        let members = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.clone()),
            _ => Err(wrong_type(key)),
        })?;
        Ok(members.unwrap_or_default())
    }

    async fn set_len(&self, key: &str) -> Result<usize> {
        let len = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.len()),
            _ => Err(wrong_type(key)),
        })?;
        Ok(len.unwrap_or(0))
    }
}
