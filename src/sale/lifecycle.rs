//! Lifecycle Ticker
//!
//! Background task that flips sale status at window boundaries:
//! upcoming -> active when the window opens, anything -> ended once it
//! closes. Runs under a Postgres advisory lock so only one node in a
//! deployment performs transitions; the others skip the tick.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::SaleService;
use crate::db::AdvisoryLock;
use crate::error::PurchaseError;

/// Advisory lock key serializing lifecycle transitions across nodes.
pub const LIFECYCLE_LOCK_KEY: i64 = 0x424C_545A_5449_434B; // "BLTZTICK"

/// Configuration for the lifecycle ticker
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// How often to scan for due transitions. 1 s keeps boundaries tight;
    /// anything under the 30 s cache TTL is acceptable.
    pub interval: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Periodic sale-state transitioner.
pub struct LifecycleTicker {
    pool: PgPool,
    sales: Arc<SaleService>,
    config: TickerConfig,
}

impl LifecycleTicker {
    pub fn new(pool: PgPool, sales: Arc<SaleService>, config: TickerConfig) -> Self {
        Self {
            pool,
            sales,
            config,
        }
    }

    /// Run the ticker loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting lifecycle ticker"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Lifecycle tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Lifecycle ticker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Run a single transition cycle. Returns how many sales changed
    /// state, or 0 when another node holds the lock.
    pub async fn tick(&self) -> Result<usize, PurchaseError> {
        let Some(guard) = AdvisoryLock::try_acquire(&self.pool, LIFECYCLE_LOCK_KEY).await? else {
            debug!("Lifecycle lock held elsewhere, skipping tick");
            return Ok(0);
        };

        let result = self.transition_due().await;
        guard.release().await?;
        result
    }

    async fn transition_due(&self) -> Result<usize, PurchaseError> {
        let now = chrono::Utc::now();

        let activated =
            crate::catalog::repository::SaleRepository::mark_active_due(&self.pool, now).await?;
        let ended =
            crate::catalog::repository::SaleRepository::mark_ended_due(&self.pool, now).await?;

        for sale_id in activated.iter().chain(ended.iter()) {
            self.sales.invalidate(*sale_id).await;
        }

        if !activated.is_empty() || !ended.is_empty() {
            info!(
                activated = activated.len(),
                ended = ended.len(),
                "Sale lifecycle transitions applied"
            );
        }

        Ok(activated.len() + ended.len())
    }
}
