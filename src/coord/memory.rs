//! In-memory coordination store
//!
//! Single-node stand-in for Redis, used when no `REDIS_URL` is configured
//! and by the test suites. TTL expiry is lazy: entries are dropped when a
//! reader touches them past their deadline.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::CoordStore;
use crate::error::PurchaseError;

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Thread-safe in-memory KV with per-key TTL.
#[derive(Default)]
pub struct MemoryCoordStore {
    entries: DashMap<String, Entry>,
}

impl MemoryCoordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired entries still pending lazy eviction
    /// are not counted).
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CoordStore for MemoryCoordStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PurchaseError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.live() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired: evict so set_nx can claim the key again.
        self.entries.remove_if(key, |_, e| !e.live());
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PurchaseError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, PurchaseError> {
        // The entry API holds the shard lock, making check-then-insert atomic.
        let mut claimed = false;
        let entry = self
            .entries
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.live() {
                    e.value = value.to_string();
                    e.expires_at = Instant::now() + ttl;
                    claimed = true;
                }
            })
            .or_insert_with(|| {
                claimed = true;
                Entry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                }
            });
        drop(entry);
        Ok(claimed)
    }

    async fn del(&self, key: &str) -> Result<(), PurchaseError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, PurchaseError> {
        let mut count = 0;
        let entry = self
            .entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.live() {
                    let current: i64 = e.value.parse().unwrap_or(0);
                    count = current + 1;
                    e.value = count.to_string();
                } else {
                    count = 1;
                    e.value = "1".to_string();
                    e.expires_at = Instant::now() + ttl;
                }
            })
            .or_insert_with(|| {
                count = 1;
                Entry {
                    value: "1".to_string(),
                    expires_at: Instant::now() + ttl,
                }
            });
        drop(entry);
        Ok(count)
    }

    async fn ping(&self) -> Result<(), PurchaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryCoordStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryCoordStore::new();
        store.set("k", "v", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx_claims_once() {
        let store = MemoryCoordStore::new();
        assert!(store.set_nx("k", "first", Duration::from_secs(60)).await.unwrap());
        assert!(!store.set_nx("k", "second", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_set_nx_reclaims_expired() {
        let store = MemoryCoordStore::new();
        assert!(store.set_nx("k", "first", Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.set_nx("k", "second", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_incr_window() {
        let store = MemoryCoordStore::new();
        assert_eq!(store.incr("r", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.incr("r", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(store.incr("r", Duration::from_secs(60)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_set_nx_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(MemoryCoordStore::new());
        let mut handles = vec![];
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .set_nx("contended", &format!("w{}", i), Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
