//! Cache store protocol.
//!
//! The gateway only needs four operations from its backing store: GET, SET with
//! a TTL, DEL and KEYS by pattern. Any key-value store with expiry and pattern
//! scans satisfies it; Redis is the production backend.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{CacheSettings, StoreBackend};

use super::{memory::MemoryStore, redis_store::RedisStore};

/// Errors raised by a [`CacheStore`].
///
/// None of these ever reach a client: the cache layer logs them and carries on
/// as if the store were empty.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache backend error: {message}")]
    Backend { message: String },
    #[error("invalid key pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
    #[error("cache operation `{op}` timed out after {elapsed_ms} ms")]
    Timeout { op: &'static str, elapsed_ms: u128 },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Backend { .. } => "backend",
            StoreError::Pattern { .. } => "pattern",
            StoreError::Timeout { .. } => "timeout",
        }
    }
}

/// Asynchronous key → string store with per-key TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value. The entry
    /// disappears once `ttl` has elapsed.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Lists live keys matching a Redis-style glob pattern (`*`, `?`, `[...]`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

/// Run a store operation, giving up after `timeout`.
pub async fn bounded<T, F>(op: &'static str, timeout: Duration, future: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            op,
            elapsed_ms: timeout.as_millis(),
        }),
    }
}

/// Build the store selected by configuration.
pub async fn connect(settings: &CacheSettings) -> Result<Arc<dyn CacheStore>, StoreError> {
    match &settings.backend {
        StoreBackend::Memory => {
            info!(
                target = "storegate::cache::store",
                backend = "memory",
                "using in-process cache store"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis { url } => {
            let store = bounded(
                "connect",
                settings.connect_timeout,
                RedisStore::connect(url.as_str()),
            )
            .await?;
            info!(
                target = "storegate::cache::store",
                backend = "redis",
                url = %url,
                "connected to cache store"
            );
            Ok(Arc::new(store))
        }
    }
}
