//! Stats Aggregator
//!
//! Derived counts over orders and stock for one sale, cached for 300 s.
//! Numbers here are telemetry; nothing on the write path depends on them.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::catalog::repository::SaleRepository;
use crate::coord::{self, CoordStore, keys};
use crate::core_types::{ProductId, SaleId};
use crate::error::PurchaseError;
use crate::orders::{OrderCounts, OrderRepository};
use crate::stock::{StockManager, StockRow};

/// Aggregated view of one sale's order and stock counters.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleStats {
    #[schema(value_type = uuid::Uuid)]
    pub sale_id: SaleId,
    #[schema(value_type = uuid::Uuid)]
    pub product_id: ProductId,
    pub total_orders: i64,
    pub confirmed: i64,
    pub pending: i64,
    pub failed: i64,
    pub total_quantity: i64,
    pub available_quantity: i64,
    pub sold_quantity: i64,
    /// confirmed / total_orders, in percent, 0 when no orders yet
    pub conversion_rate: f64,
}

impl SaleStats {
    fn build(sale_id: SaleId, counts: OrderCounts, stock: &StockRow) -> Self {
        let total_orders = counts.total();
        let conversion_rate = if total_orders > 0 {
            (counts.confirmed as f64 / total_orders as f64) * 100.0
        } else {
            0.0
        };
        Self {
            sale_id,
            product_id: stock.product_id,
            total_orders,
            confirmed: counts.confirmed,
            pending: counts.pending,
            failed: counts.failed,
            total_quantity: stock.level.total(),
            available_quantity: stock.level.available(),
            sold_quantity: stock.level.sold(),
            conversion_rate,
        }
    }
}

pub struct StatsAggregator {
    pool: PgPool,
    coord: Arc<dyn CoordStore>,
    stock: StockManager,
    cache_ttl: Duration,
}

impl StatsAggregator {
    pub fn new(
        pool: PgPool,
        coord: Arc<dyn CoordStore>,
        stock: StockManager,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            coord,
            stock,
            cache_ttl,
        }
    }

    /// Stats for one sale, cache-aside with a 300 s TTL.
    pub async fn sale_stats(&self, sale_id: SaleId) -> Result<Option<SaleStats>, PurchaseError> {
        let key = keys::sale_stats(sale_id);
        if let Some(cached) = coord::get_json::<SaleStats>(self.coord.as_ref(), &key).await? {
            return Ok(Some(cached));
        }

        let Some(sale) = SaleRepository::get(&self.pool, sale_id).await? else {
            return Ok(None);
        };
        let counts = OrderRepository::counts_for_product(&self.pool, sale.product_id).await?;
        let stock = self
            .stock
            .get(sale.product_id)
            .await?
            .ok_or_else(|| PurchaseError::Internal("sale product has no stock row".into()))?;

        let stats = SaleStats::build(sale_id, counts, &stock);
        coord::set_json(self.coord.as_ref(), &key, &stats, self.cache_ttl).await?;
        Ok(Some(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::StockLevel;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_stats_projection() {
        let stock = StockRow {
            product_id: Uuid::new_v4(),
            level: StockLevel::from_parts(10, 2, 1).unwrap(),
            last_updated: Utc::now(),
        };
        let counts = OrderCounts {
            pending: 1,
            confirmed: 7,
            failed: 2,
        };

        let stats = SaleStats::build(Uuid::new_v4(), counts, &stock);
        assert_eq!(stats.total_orders, 10);
        assert_eq!(stats.confirmed, 7);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.sold_quantity, 7);
        assert!((stats.conversion_rate - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_no_orders() {
        let stock = StockRow {
            product_id: Uuid::new_v4(),
            level: StockLevel::new(10),
            last_updated: Utc::now(),
        };
        let stats = SaleStats::build(Uuid::new_v4(), OrderCounts::default(), &stock);
        assert_eq!(stats.total_orders, 0);
        assert_eq!(stats.conversion_rate, 0.0);
        assert_eq!(stats.sold_quantity, 0);
    }
}
