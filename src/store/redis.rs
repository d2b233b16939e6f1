//! Redis/Valkey backed key-value store using a bb8 connection pool

use async_trait::async_trait;
use bb8_redis::bb8::Pool;
use bb8_redis::redis::{self, AsyncCommands};
use bb8_redis::RedisConnectionManager;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::store::KeyValueStore;

/// Store shared by every service instance
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
}

fn ttl_millis(ttl: Duration) -> u64 {
    // Redis rejects a zero expiry
    (ttl.as_millis() as u64).max(1)
}

impl RedisStore {
    /// Build the pool and verify the connection with a PING
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self> {
        let manager = RedisConnectionManager::new(url)?;
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .await?;

        let store = Self { pool };
        store.ping().await?;
        Ok(store)
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let reply: String = redis::cmd("PING").query_async(&mut *conn).await?;
        if reply != "PONG" {
            return Err(AppError::Store(format!("unexpected PING reply: {}", reply)));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut *conn).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        // SET NX replies OK when written and nil otherwise
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let value: i64 = conn.hincr(key, field, delta).await?;
        Ok(value)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>> {
        let mut conn = self.pool.get().await?;
        let values: HashMap<String, i64> = conn.hgetall(key).await?;
        Ok(values)
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let len: usize = conn.lpush(key, value).await?;
        Ok(len)
    }

    async fn list_trim(&self, key: &str, start: usize, stop: usize) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.ltrim(key, start as isize, stop as isize).await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: usize, stop: Option<usize>) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let stop = stop.map_or(-1, |s| s as isize);
        let values: Vec<String> = conn.lrange(key, start as isize, stop).await?;
        Ok(values)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let mut pipe = redis::pipe();
        pipe.atomic().sadd(key, member).ignore();
        if let Some(ttl) = ttl {
            pipe.pexpire(key, ttl_millis(ttl) as i64).ignore();
        }
        let _: () = pipe.query_async(&mut *conn).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>> {
        let mut conn = self.pool.get().await?;
        let members: HashSet<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let len: usize = conn.scard(key).await?;
        Ok(len)
    }
}
