//! Storage for cached step results, keyed by input fingerprint.
//!
//! A cached entry lets an execution skip a cacheable step whose resolved
//! inputs match a prior successful run within the step's ttl window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Everything a cache hit replays in place of running the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedStep {
    /// Output locations, keyed by slot label.
    pub outputs: BTreeMap<String, String>,
    /// Documents the job wrote, keyed by location.
    pub documents: BTreeMap<String, serde_json::Value>,
    /// Scraped metrics.
    pub metrics: BTreeMap<String, f64>,
    /// When the cached job finished.
    pub created_at: DateTime<Utc>,
    /// When the entry stops being reusable; `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedStep {
    /// Creates an entry recorded at `created_at`, without expiry.
    #[must_use]
    pub fn new(
        outputs: BTreeMap<String, String>,
        documents: BTreeMap<String, serde_json::Value>,
        metrics: BTreeMap<String, f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            outputs,
            documents,
            metrics,
            created_at,
            expires_at: None,
        }
    }

    /// Sets the expiry from a ttl.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl));
        self
    }

    /// Returns true if the entry has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Protocol for cache storage backends.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Gets a live entry; expired entries are evicted and not returned.
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CachedStep>;

    /// Stores an entry, replacing any previous one.
    async fn put(&self, key: &str, entry: CachedStep);

    /// Clears all entries.
    async fn clear(&self);
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, CachedStep>>>,
}

impl InMemoryCacheStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CachedStep> {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(key) {
            if entry.is_expired(now) {
                entries.remove(key);
                return None;
            }
            return Some(entry.clone());
        }

        None
    }

    async fn put(&self, key: &str, entry: CachedStep) {
        self.entries.lock().insert(key.to_string(), entry);
    }

    async fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(created_at: DateTime<Utc>) -> CachedStep {
        let mut outputs = BTreeMap::new();
        outputs.insert("train_data".to_string(), "s3://bucket/outputs/train".to_string());
        CachedStep::new(outputs, BTreeMap::new(), BTreeMap::new(), created_at)
            .with_ttl(Duration::from_secs(30 * 24 * 60 * 60))
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let store = InMemoryCacheStore::new();
        let now = Utc::now();
        store.put("key", entry(now)).await;

        let hit = store.get("key", now + chrono::Duration::days(29)).await;
        assert_eq!(hit.unwrap().outputs["train_data"], "s3://bucket/outputs/train");
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let store = InMemoryCacheStore::new();
        let now = Utc::now();
        store.put("key", entry(now)).await;

        assert!(store.get("key", now + chrono::Duration::days(30)).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryCacheStore::new();
        store.put("a", entry(Utc::now())).await;
        store.put("b", entry(Utc::now())).await;
        assert_eq!(store.len(), 2);

        store.clear().await;
        assert!(store.is_empty());
    }
}
