//! Coordination store
//!
//! Fast KV used for the sale-status cache, rate tokens, job state, user
//! purchase state and reservation markers. Distinct from the durable
//! relational store: everything here is ephemeral and TTL-bound.
//!
//! The trait keeps the process runnable in two modes: Redis for real
//! deployments (multi-node pools share job state) and an in-memory store
//! for single-node dev and tests.

pub mod memory;
pub mod redis;

pub use memory::MemoryCoordStore;
pub use self::redis::RedisCoordStore;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::PurchaseError;

/// Minimal KV contract the pipeline needs from the coordination store.
#[async_trait]
pub trait CoordStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PurchaseError>;

    /// Set with TTL, overwriting any existing value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PurchaseError>;

    /// Set with TTL only if the key does not exist. Returns whether the
    /// write happened. This is the admission critical section.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, PurchaseError>;

    async fn del(&self, key: &str) -> Result<(), PurchaseError>;

    /// Atomically increment a counter, attaching the TTL when the key is
    /// created. Returns the post-increment value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, PurchaseError>;

    async fn ping(&self) -> Result<(), PurchaseError>;
}

/// Read a JSON-serialized value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CoordStore,
    key: &str,
) -> Result<Option<T>, PurchaseError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Write a JSON-serialized value with TTL.
pub async fn set_json<T: Serialize>(
    store: &dyn CoordStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), PurchaseError> {
    store.set(key, &serde_json::to_string(value)?, ttl).await
}

/// Coordination-store key layout.
///
/// ```text
/// purchase_job:<jobId>            TTL 3600
/// purchase_status:<userId>        TTL 1800
/// flash_sale_status[_<saleId>]    TTL 30
/// sale_stats:<saleId>             TTL 300
/// rate_limit:<userId>             TTL 60
/// stock_hold:<jobId>              reservation marker for stalled recovery
/// ```
pub mod keys {
    use crate::core_types::{JobId, SaleId, UserId};

    pub fn purchase_job(job_id: JobId) -> String {
        format!("purchase_job:{}", job_id)
    }

    pub fn purchase_status(user_id: UserId) -> String {
        format!("purchase_status:{}", user_id)
    }

    /// Sale status cache. The bare key aliases "the current active sale".
    pub fn sale_status(sale_id: Option<SaleId>) -> String {
        match sale_id {
            Some(id) => format!("flash_sale_status_{}", id),
            None => "flash_sale_status".to_string(),
        }
    }

    pub fn sale_stats(sale_id: SaleId) -> String {
        format!("sale_stats:{}", sale_id)
    }

    pub fn rate_limit(user_id: UserId) -> String {
        format!("rate_limit:{}", user_id)
    }

    pub fn stock_hold(job_id: JobId) -> String {
        format!("stock_hold:{}", job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            keys::purchase_job(id),
            "purchase_job:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(keys::sale_status(None), "flash_sale_status");
        assert!(keys::sale_status(Some(id)).starts_with("flash_sale_status_"));
        assert!(keys::rate_limit(id).starts_with("rate_limit:"));
    }
}
