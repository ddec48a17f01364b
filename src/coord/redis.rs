//! Redis-backed coordination store
//!
//! The deployment default. A `ConnectionManager` multiplexes one
//! reconnecting connection across all services; clones are cheap.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::CoordStore;
use crate::error::PurchaseError;

#[derive(Clone)]
pub struct RedisCoordStore {
    conn: ConnectionManager,
}

impl RedisCoordStore {
    pub async fn connect(url: &str) -> Result<Self, PurchaseError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("Redis coordination store connected");
        Ok(Self { conn })
    }

    /// Share the underlying connection (used by the Redis job queue).
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CoordStore for RedisCoordStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PurchaseError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PurchaseError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, PurchaseError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<(), PurchaseError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, PurchaseError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(key, ttl_secs(ttl) as i64).await?;
        }
        Ok(count)
    }

    async fn ping(&self) -> Result<(), PurchaseError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
