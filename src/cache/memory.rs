//! In-process cache store.
//!
//! Used by tests and single-node runs without Redis. Entries carry their own
//! deadline; expired entries read as absent and are purged lazily.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use glob::Pattern;

use super::store::{CacheStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTL-aware in-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self, now: Instant) {
        self.entries.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::backend(format!("ttl {ttl:?} overflows the clock")))?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher =
            Pattern::new(pattern).map_err(|err| StoreError::pattern(pattern, err.to_string()))?;
        let now = Instant::now();
        self.purge_expired(now);

        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| matcher.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.expect("get").is_none());

        store.set("k", "{\"id\":\"1\"}", TTL).await.expect("set");

        assert_eq!(
            store.get("k").await.expect("get").as_deref(),
            Some("{\"id\":\"1\"}")
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn later_set_overwrites_earlier_value() {
        let store = MemoryStore::new();
        store.set("k", "first", TTL).await.expect("set");
        store.set("k", "second", TTL).await.expect("set");

        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("short", "v", Duration::from_millis(30))
            .await
            .expect("set");
        assert!(store.get("short").await.expect("get").is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(store.get("short").await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_live_key_was_removed() {
        let store = MemoryStore::new();
        store.set("k", "v", TTL).await.expect("set");

        assert!(store.delete("k").await.expect("delete"));
        assert!(!store.delete("k").await.expect("delete"));
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn keys_match_glob_patterns() {
        let store = MemoryStore::new();
        store
            .set("products:cache:_api_products", "a", TTL)
            .await
            .expect("set");
        store
            .set("products:cache:_api_products_7", "b", TTL)
            .await
            .expect("set");
        store
            .set("orders:cache:_api_orders", "c", TTL)
            .await
            .expect("set");

        let keys = store.keys("products:cache:*").await.expect("keys");
        assert_eq!(
            keys,
            vec![
                "products:cache:_api_products".to_string(),
                "products:cache:_api_products_7".to_string(),
            ]
        );

        let keys = store.keys("*api_products_?").await.expect("keys");
        assert_eq!(keys, vec!["products:cache:_api_products_7".to_string()]);
    }

    #[tokio::test]
    async fn keys_skip_expired_entries() {
        let store = MemoryStore::new();
        store
            .set("gone", "v", Duration::from_millis(10))
            .await
            .expect("set");
        store.set("kept", "v", TTL).await.expect("set");

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(
            store.keys("*").await.expect("keys"),
            vec!["kept".to_string()]
        );
    }

    #[tokio::test]
    async fn invalid_pattern_is_reported() {
        let store = MemoryStore::new();
        let err = store.keys("[unclosed").await.expect_err("pattern error");
        assert!(matches!(err, StoreError::Pattern { .. }));
    }
}
