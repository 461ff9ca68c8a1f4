//! Redis-backed cache store.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};

use super::store::{CacheStore, StoreError};

/// [`CacheStore`] over a multiplexed, auto-reconnecting Redis connection.
///
/// Values are stored as plain strings with a millisecond TTL (`SET .. PX ..`).
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|err| redis_error("open", &err))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| redis_error("connect", &err))?;
        Ok(Self { conn })
    }
}

fn redis_error(op: &'static str, err: &RedisError) -> StoreError {
    StoreError::backend(format!("redis {op} failed: {err}"))
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|err| redis_error("GET", &err))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(|err| redis_error("SET", &err))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|err| redis_error("DEL", &err))?;
        Ok(removed > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.keys(pattern)
            .await
            .map_err(|err| redis_error("KEYS", &err))
    }
}
