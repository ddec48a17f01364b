//! Database connection management and schema bootstrap

pub mod schema;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Row};
use std::time::Duration;

use crate::error::PurchaseError;

/// PostgreSQL database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by tests)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Session-scoped Postgres advisory lock.
///
/// Lock and unlock must run on the same connection, so the guard pins one
/// out of the pool for its lifetime. Callers must `release()` explicitly;
/// a guard dropped without release returns the connection with the lock
/// still held, which Postgres clears only when the session ends.
pub struct AdvisoryLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

impl AdvisoryLock {
    /// Try to acquire the named lock without blocking.
    ///
    /// Returns `None` when another session holds it.
    pub async fn try_acquire(pool: &PgPool, key: i64) -> Result<Option<Self>, PurchaseError> {
        let mut conn = pool.acquire().await?;
        let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS locked")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;
        let locked: bool = row.get("locked");
        if locked {
            Ok(Some(Self { conn, key }))
        } else {
            Ok(None)
        }
    }

    /// Release the lock and return the connection to the pool.
    pub async fn release(mut self) -> Result<(), PurchaseError> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
