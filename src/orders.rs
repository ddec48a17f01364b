//! Order rows and their repository
//!
//! Orders are created only by the purchase worker, between stock reserve
//! and stock confirm. The UNIQUE(user_id, product_id) index is the
//! authoritative same-user dedup: even if one job is processed twice, at
//! most one row can exist, and the second insert reports the existing row
//! instead of erroring blindly.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::fmt;
use uuid::Uuid;

use crate::core_types::{OrderId, ProductId, UserId};
use crate::error::PurchaseError;

/// Order lifecycle states
///
/// pending -> confirmed on successful stock confirm, or pending -> failed
/// on rollback. Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum OrderStatus {
    Pending = 0,
    Confirmed = 1,
    Failed = 2,
}

impl OrderStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(OrderStatus::Pending),
            1 => Some(OrderStatus::Confirmed),
            2 => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of an order insert attempt.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// Fresh row created in `pending`.
    Inserted(Order),
    /// The UNIQUE(user, product) backstop fired; here is the row that won.
    Duplicate(Order),
}

/// Per-status counts for one product's orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderCounts {
    pub pending: i64,
    pub confirmed: i64,
    pub failed: i64,
}

impl OrderCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.confirmed + self.failed
    }
}

/// Order repository. The worker pool is the only writer.
pub struct OrderRepository;

impl OrderRepository {
    /// Insert a pending order, reporting a duplicate instead of failing
    /// when the (user, product) slot is already taken.
    pub async fn insert_pending(
        pool: &PgPool,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<InsertOutcome, PurchaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders_tb (order_id, user_id, product_id, status)
            VALUES ($1, $2, $3, $4)
            RETURNING order_id, user_id, product_id, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(product_id)
        .bind(OrderStatus::Pending.id())
        .fetch_one(pool)
        .await;

        match result {
            Ok(row) => Ok(InsertOutcome::Inserted(row_to_order(&row)?)),
            Err(e) if is_unique_violation(&e) => {
                let existing = Self::get_by_user_product(pool, user_id, product_id)
                    .await?
                    .ok_or_else(|| {
                        PurchaseError::Internal("duplicate order row vanished".into())
                    })?;
                Ok(InsertOutcome::Duplicate(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// pending -> confirmed. Returns false when the row was not pending
    /// (another worker already finalized it).
    pub async fn confirm(pool: &PgPool, order_id: OrderId) -> Result<bool, PurchaseError> {
        let result = sqlx::query(
            "UPDATE orders_tb SET status = $2, updated_at = NOW() WHERE order_id = $1 AND status = $3",
        )
        .bind(order_id)
        .bind(OrderStatus::Confirmed.id())
        .bind(OrderStatus::Pending.id())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// pending -> failed. Same CAS guard as [`Self::confirm`].
    pub async fn fail(pool: &PgPool, order_id: OrderId) -> Result<bool, PurchaseError> {
        let result = sqlx::query(
            "UPDATE orders_tb SET status = $2, updated_at = NOW() WHERE order_id = $1 AND status = $3",
        )
        .bind(order_id)
        .bind(OrderStatus::Failed.id())
        .bind(OrderStatus::Pending.id())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(pool: &PgPool, order_id: OrderId) -> Result<Option<Order>, PurchaseError> {
        let row = sqlx::query(
            "SELECT order_id, user_id, product_id, status, created_at, updated_at FROM orders_tb WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(pool)
        .await?;

        row.map(|r| row_to_order(&r)).transpose()
    }

    pub async fn get_by_user_product(
        pool: &PgPool,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Order>, PurchaseError> {
        let row = sqlx::query(
            r#"
            SELECT order_id, user_id, product_id, status, created_at, updated_at
            FROM orders_tb WHERE user_id = $1 AND product_id = $2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(pool)
        .await?;

        row.map(|r| row_to_order(&r)).transpose()
    }

    /// Per-status order counts for one product (stats read path).
    pub async fn counts_for_product(
        pool: &PgPool,
        product_id: ProductId,
    ) -> Result<OrderCounts, PurchaseError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM orders_tb WHERE product_id = $1 GROUP BY status",
        )
        .bind(product_id)
        .fetch_all(pool)
        .await?;

        let mut counts = OrderCounts::default();
        for row in rows {
            let n: i64 = row.get("n");
            match OrderStatus::from_id(row.get("status")) {
                Some(OrderStatus::Pending) => counts.pending = n,
                Some(OrderStatus::Confirmed) => counts.confirmed = n,
                Some(OrderStatus::Failed) => counts.failed = n,
                None => {}
            }
        }
        Ok(counts)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn row_to_order(row: &PgRow) -> Result<Order, PurchaseError> {
    let status_id: i16 = row.get("status");
    let status = OrderStatus::from_id(status_id)
        .ok_or_else(|| PurchaseError::Internal(format!("invalid order status id: {}", status_id)))?;

    Ok(Order {
        order_id: row.get("order_id"),
        user_id: row.get("user_id"),
        product_id: row.get("product_id"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Failed] {
            assert_eq!(OrderStatus::from_id(status.id()), Some(status));
        }
        assert!(OrderStatus::from_id(-1).is_none());
    }

    #[test]
    fn test_counts_total() {
        let counts = OrderCounts {
            pending: 1,
            confirmed: 7,
            failed: 2,
        };
        assert_eq!(counts.total(), 10);
    }
}
