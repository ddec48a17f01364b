//! Sale Service
//!
//! Read path for sale status with a short-TTL cache in the coordination
//! store, plus the uncached load used by the worker at commit time. The
//! status field returned to clients is always derived from the wall
//! clock, never from the stored column.

pub mod lifecycle;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::catalog::models::SaleStatus;
use crate::catalog::repository::{SaleBundle, SaleRepository};
use crate::coord::{self, CoordStore, keys};
use crate::core_types::{ProductId, SaleId};
use crate::error::PurchaseError;

/// Projection of a sale as served to clients and cached in the
/// coordination store (TTL 30 s).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleSnapshot {
    #[schema(value_type = uuid::Uuid)]
    pub sale_id: SaleId,
    #[schema(value_type = uuid::Uuid)]
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    #[schema(value_type = String, example = "499.99")]
    pub price: Decimal,
    pub image_url: Option<String>,
    pub status: SaleStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds until the window opens; 0 once open.
    pub time_until_start: i64,
    /// Seconds until the window closes; 0 once closed.
    pub time_until_end: i64,
    pub total_quantity: i64,
    pub available_quantity: i64,
    pub sold_quantity: i64,
}

impl SaleSnapshot {
    pub fn from_bundle(bundle: &SaleBundle, now: DateTime<Utc>) -> Self {
        let sale = &bundle.sale;
        Self {
            sale_id: sale.sale_id,
            product_id: sale.product_id,
            name: bundle.product.name.clone(),
            description: bundle.product.description.clone(),
            price: bundle.product.price,
            image_url: bundle.product.image_url.clone(),
            status: sale.status_at(now),
            start_time: sale.start_time,
            end_time: sale.end_time,
            time_until_start: (sale.start_time - now).num_seconds().max(0),
            time_until_end: (sale.end_time - now).num_seconds().max(0),
            total_quantity: bundle.stock.level.total(),
            available_quantity: bundle.stock.level.available(),
            sold_quantity: bundle.stock.level.sold(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SaleStatus::Active
    }
}

/// Read-side contract the admission gateway depends on.
#[async_trait]
pub trait SaleReader: Send + Sync {
    /// Cached sale snapshot; `None` resolves the current active sale.
    async fn status_snapshot(
        &self,
        sale_id: Option<SaleId>,
    ) -> Result<Option<SaleSnapshot>, PurchaseError>;
}

/// Sale status read path with cache-aside over the coordination store.
pub struct SaleService {
    pool: PgPool,
    coord: Arc<dyn CoordStore>,
    cache_ttl: Duration,
}

impl SaleService {
    pub fn new(pool: PgPool, coord: Arc<dyn CoordStore>, cache_ttl: Duration) -> Self {
        Self {
            pool,
            coord,
            cache_ttl,
        }
    }

    /// Cached status read. On a miss the joined (sale, product, stock) row
    /// is loaded, projected with the clock-derived status, and written
    /// back under the requested key.
    pub async fn get_status(
        &self,
        sale_id: Option<SaleId>,
    ) -> Result<Option<SaleSnapshot>, PurchaseError> {
        let key = keys::sale_status(sale_id);
        if let Some(cached) = coord::get_json::<SaleSnapshot>(self.coord.as_ref(), &key).await? {
            return Ok(Some(cached));
        }

        let now = Utc::now();
        let Some(bundle) = SaleRepository::load_bundle(&self.pool, sale_id, now).await? else {
            return Ok(None);
        };

        let snapshot = SaleSnapshot::from_bundle(&bundle, now);
        coord::set_json(self.coord.as_ref(), &key, &snapshot, self.cache_ttl).await?;
        Ok(Some(snapshot))
    }

    /// Uncached load for the commit path. The cache is read-only for
    /// status display; oversell prevention never depends on it.
    pub async fn load_uncached(
        &self,
        sale_id: Option<SaleId>,
    ) -> Result<Option<SaleBundle>, PurchaseError> {
        SaleRepository::load_bundle(&self.pool, sale_id, Utc::now()).await
    }

    /// Drop the cache entries covering a sale. Failures are logged and
    /// swallowed; stale entries self-heal at the TTL boundary.
    pub async fn invalidate(&self, sale_id: SaleId) {
        for key in [keys::sale_status(Some(sale_id)), keys::sale_status(None)] {
            if let Err(e) = self.coord.del(&key).await {
                tracing::warn!(error = %e, key = %key, "Sale cache invalidation failed");
            }
        }
    }
}

#[async_trait]
impl SaleReader for SaleService {
    async fn status_snapshot(
        &self,
        sale_id: Option<SaleId>,
    ) -> Result<Option<SaleSnapshot>, PurchaseError> {
        self.get_status(sale_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::{FlashSale, Product};
    use crate::stock::{StockLevel, StockRow};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn bundle(start: DateTime<Utc>, end: DateTime<Utc>, total: i64, available: i64) -> SaleBundle {
        let product_id = Uuid::new_v4();
        SaleBundle {
            sale: FlashSale {
                sale_id: Uuid::new_v4(),
                product_id,
                start_time: start,
                end_time: end,
                status: SaleStatus::Upcoming,
                created_at: start,
                updated_at: start,
            },
            product: Product {
                product_id,
                name: "Limited Widget".into(),
                description: "One per customer".into(),
                price: Decimal::new(49999, 2),
                image_url: None,
                created_at: start,
                updated_at: start,
            },
            stock: StockRow {
                product_id,
                level: StockLevel::from_parts(total, available, 0).unwrap(),
                last_updated: start,
            },
        }
    }

    #[test]
    fn test_snapshot_projection() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();
        let bundle = bundle(start, end, 100, 93);

        let mid = start + chrono::Duration::minutes(10);
        let snapshot = SaleSnapshot::from_bundle(&bundle, mid);
        assert_eq!(snapshot.status, SaleStatus::Active);
        assert!(snapshot.is_active());
        assert_eq!(snapshot.time_until_start, 0);
        assert_eq!(snapshot.time_until_end, 50 * 60);
        assert_eq!(snapshot.total_quantity, 100);
        assert_eq!(snapshot.available_quantity, 93);
        assert_eq!(snapshot.sold_quantity, 7);
    }

    #[test]
    fn test_snapshot_before_window() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();
        let bundle = bundle(start, end, 10, 10);

        let before = start - chrono::Duration::seconds(90);
        let snapshot = SaleSnapshot::from_bundle(&bundle, before);
        assert_eq!(snapshot.status, SaleStatus::Upcoming);
        assert_eq!(snapshot.time_until_start, 90);
        assert!(!snapshot.is_active());
    }

    #[test]
    fn test_snapshot_serde_camel_case() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();
        let snapshot = SaleSnapshot::from_bundle(&bundle(start, end, 5, 5), start);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("availableQuantity").is_some());
        assert!(json.get("timeUntilEnd").is_some());
        assert_eq!(json["status"], "active");
    }
}
