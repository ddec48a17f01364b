//! Stock Manager
//!
//! Sole writer of stock rows. The reserve/confirm/release protocol keeps a
//! clean rollback point between claiming a unit and finalizing it: the
//! order-row insertion (which can fail on the UNIQUE(user, product)
//! backstop) happens between reserve and confirm.
//!
//! Every mutation is a single conditional `UPDATE ... WHERE` so the row
//! lock and the quantity check are one atomic step; there is no
//! read-modify-write outside the database.

pub mod level;

pub use level::StockLevel;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::core_types::ProductId;
use crate::error::PurchaseError;

/// A stock row as stored, with the level invariants re-validated on load.
#[derive(Debug, Clone)]
pub struct StockRow {
    pub product_id: ProductId,
    pub level: StockLevel,
    pub last_updated: DateTime<Utc>,
}

impl StockRow {
    fn from_row(row: &PgRow) -> Result<Self, PurchaseError> {
        let level = StockLevel::from_parts(
            row.get("total_quantity"),
            row.get("available_quantity"),
            row.get("reserved_quantity"),
        )
        .map_err(|e| PurchaseError::InvariantViolation(e.to_string()))?;

        Ok(Self {
            product_id: row.get("product_id"),
            level,
            last_updated: row.get("last_updated"),
        })
    }
}

const STOCK_COLUMNS: &str = "product_id, total_quantity, available_quantity, reserved_quantity, last_updated";

/// Postgres-backed stock operations.
#[derive(Clone)]
pub struct StockManager {
    pool: PgPool,
}

impl StockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the stock row for a product. `total` is the pre-sale
    /// snapshot and is never mutated by the purchase path.
    pub async fn create(&self, product_id: ProductId, total: i64) -> Result<StockRow, PurchaseError> {
        if total < 0 {
            return Err(PurchaseError::InvalidRequest("negative stock total".into()));
        }
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO stocks_tb (product_id, total_quantity, available_quantity, reserved_quantity)
            VALUES ($1, $2, $2, 0)
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(product_id)
        .bind(total)
        .fetch_one(&self.pool)
        .await?;

        StockRow::from_row(&row)
    }

    pub async fn get(&self, product_id: ProductId) -> Result<Option<StockRow>, PurchaseError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks_tb WHERE product_id = $1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| StockRow::from_row(&r)).transpose()
    }

    /// Claim `qty` units: available -= qty, reserved += qty.
    ///
    /// The `available_quantity >= qty` guard in the WHERE clause is the
    /// oversell gate; zero affected rows means someone else took the last
    /// unit first.
    pub async fn reserve(&self, product_id: ProductId, qty: i64) -> Result<StockRow, PurchaseError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE stocks_tb
            SET available_quantity = available_quantity - $2,
                reserved_quantity  = reserved_quantity + $2,
                last_updated       = NOW()
            WHERE product_id = $1 AND available_quantity >= $2
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(product_id)
        .bind(qty)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => StockRow::from_row(&r),
            None => Err(PurchaseError::OutOfStock),
        }
    }

    /// Finalize `qty` reserved units: reserved -= qty. The units leave the
    /// available + reserved pool and show up as sold.
    pub async fn confirm(&self, product_id: ProductId, qty: i64) -> Result<StockRow, PurchaseError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE stocks_tb
            SET reserved_quantity = reserved_quantity - $2,
                last_updated      = NOW()
            WHERE product_id = $1 AND reserved_quantity >= $2
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(product_id)
        .bind(qty)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => StockRow::from_row(&r),
            None => Err(PurchaseError::InvariantViolation(format!(
                "confirm {} on product {} exceeds reservation",
                qty, product_id
            ))),
        }
    }

    /// Undo a reservation: available += qty, reserved -= qty. Used when
    /// order creation fails after a successful reserve, and by stalled-job
    /// recovery.
    pub async fn release(&self, product_id: ProductId, qty: i64) -> Result<StockRow, PurchaseError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE stocks_tb
            SET available_quantity = available_quantity + $2,
                reserved_quantity  = reserved_quantity - $2,
                last_updated       = NOW()
            WHERE product_id = $1 AND reserved_quantity >= $2
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(product_id)
        .bind(qty)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => StockRow::from_row(&r),
            None => Err(PurchaseError::InvariantViolation(format!(
                "release {} on product {} exceeds reservation",
                qty, product_id
            ))),
        }
    }
}
