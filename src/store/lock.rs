//! Cross-instance lock kept entirely in the store

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::store::KeyValueStore;

fn lock_key(name: &str) -> String {
    format!("lock:{}", name)
}

#[derive(Clone)]
pub struct GenerationLock {
    store: Arc<dyn KeyValueStore>,
}

impl GenerationLock {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Take the lock if nobody holds it. Expires on its own after `ttl`.
    pub async fn try_acquire(&self, name: &str, holder_id: &str, ttl: Duration) -> Result<bool> {
        let acquired = self
            .store
            .set_if_absent(&lock_key(name), holder_id, ttl)
            .await?;
        debug!(lock = %name, holder = %holder_id, acquired, "Lock acquire attempt");
        Ok(acquired)
    }

    /// Release the lock if `holder_id` still owns it. The read and delete are
    /// separate calls; a lock that expired in between may be released from
    /// under its new holder, bounded by the TTL.
    pub async fn release(&self, name: &str, holder_id: &str) -> Result<bool> {
        let key = lock_key(name);
        match self.store.get(&key).await? {
            Some(current) if current == holder_id => self.store.delete(&key).await,
            _ => Ok(false),
        }
    }
}
