//! Repository layer for catalog database operations

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use super::models::{FlashSale, Product, Role, SaleStatus, User};
use crate::core_types::{ProductId, SaleId, UserId};
use crate::error::PurchaseError;
use crate::stock::{StockLevel, StockRow};

/// User repository: auto-registration and lookups
pub struct UserRepository;

impl UserRepository {
    /// Find or create the user for an email (case-insensitive match).
    ///
    /// Two concurrent first-sight logins race on the unique email index;
    /// the loser's insert is a no-op and both read the same row back.
    pub async fn ensure_by_email(pool: &PgPool, email: &str) -> Result<User, PurchaseError> {
        if let Some(user) = Self::get_by_email(pool, email).await? {
            return Ok(user);
        }

        sqlx::query(
            r#"
            INSERT INTO users_tb (user_id, email, role)
            VALUES ($1, $2, $3)
            ON CONFLICT ((LOWER(email))) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(Role::User.id())
        .execute(pool)
        .await?;

        Self::get_by_email(pool, email)
            .await?
            .ok_or_else(|| PurchaseError::Internal("user vanished after registration".into()))
    }

    pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, PurchaseError> {
        let row = sqlx::query(
            "SELECT user_id, email, role, created_at FROM users_tb WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn get_by_id(pool: &PgPool, user_id: UserId) -> Result<Option<User>, PurchaseError> {
        let row =
            sqlx::query("SELECT user_id, email, role, created_at FROM users_tb WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        Ok(row.map(|r| row_to_user(&r)))
    }

    /// Change a user's role (admin surface only).
    pub async fn set_role(pool: &PgPool, user_id: UserId, role: Role) -> Result<(), PurchaseError> {
        sqlx::query("UPDATE users_tb SET role = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(role.id())
            .execute(pool)
            .await?;
        Ok(())
    }
}

fn row_to_user(row: &PgRow) -> User {
    User {
        user_id: row.get("user_id"),
        email: row.get("email"),
        role: Role::from_id(row.get("role")),
        created_at: row.get("created_at"),
    }
}

/// Product repository
pub struct ProductRepository;

impl ProductRepository {
    pub async fn create(
        pool: &PgPool,
        name: &str,
        description: &str,
        price: rust_decimal::Decimal,
        image_url: Option<&str>,
    ) -> Result<Product, PurchaseError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products_tb (product_id, name, description, price, image_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING product_id, name, description, price, image_url, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(image_url)
        .fetch_one(pool)
        .await?;

        Ok(row_to_product(&row, ""))
    }

    pub async fn get(pool: &PgPool, product_id: ProductId) -> Result<Option<Product>, PurchaseError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, description, price, image_url, created_at, updated_at
            FROM products_tb WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| row_to_product(&r, "")))
    }
}

fn row_to_product(row: &PgRow, prefix: &str) -> Product {
    let col = |name: &str| format!("{}{}", prefix, name);
    Product {
        product_id: row.get("product_id"),
        name: row.get(col("name").as_str()),
        description: row.get(col("description").as_str()),
        price: row.get(col("price").as_str()),
        image_url: row.get(col("image_url").as_str()),
        created_at: row.get(col("created_at").as_str()),
        updated_at: row.get(col("updated_at").as_str()),
    }
}

/// A sale joined with its product and stock, as loaded for the commit
/// path and the status cache fill.
#[derive(Debug, Clone)]
pub struct SaleBundle {
    pub sale: FlashSale,
    pub product: Product,
    pub stock: StockRow,
}

/// Flash sale repository
pub struct SaleRepository;

impl SaleRepository {
    pub async fn create(
        pool: &PgPool,
        product_id: ProductId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<FlashSale, PurchaseError> {
        if end_time <= start_time {
            return Err(PurchaseError::InvalidRequest(
                "end_time must be after start_time".into(),
            ));
        }

        // Seed the stored column from the clock so a sale created mid-window
        // is visible before the first ticker pass.
        let now = Utc::now();
        let initial = if now < start_time {
            SaleStatus::Upcoming
        } else if now > end_time {
            SaleStatus::Ended
        } else {
            SaleStatus::Active
        };

        let row = sqlx::query(
            r#"
            INSERT INTO flash_sales_tb (sale_id, product_id, start_time, end_time, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING sale_id, product_id, start_time, end_time, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(start_time)
        .bind(end_time)
        .bind(initial.id())
        .fetch_one(pool)
        .await?;

        row_to_sale(&row)
    }

    pub async fn get(pool: &PgPool, sale_id: SaleId) -> Result<Option<FlashSale>, PurchaseError> {
        let row = sqlx::query(
            r#"
            SELECT sale_id, product_id, start_time, end_time, status, created_at, updated_at
            FROM flash_sales_tb WHERE sale_id = $1
            "#,
        )
        .bind(sale_id)
        .fetch_optional(pool)
        .await?;

        row.map(|r| row_to_sale(&r)).transpose()
    }

    /// Load a sale with its product and stock in one round trip. With no
    /// `sale_id` this resolves the most recent sale whose window contains
    /// `now` (the admin path guarantees at most one active sale per
    /// product; across products the latest start wins).
    pub async fn load_bundle(
        pool: &PgPool,
        sale_id: Option<SaleId>,
        now: DateTime<Utc>,
    ) -> Result<Option<SaleBundle>, PurchaseError> {
        let base = r#"
            SELECT s.sale_id, s.product_id, s.start_time, s.end_time, s.status,
                   s.created_at, s.updated_at,
                   p.name AS product_name, p.description AS product_description,
                   p.price AS product_price, p.image_url AS product_image_url,
                   p.created_at AS product_created_at, p.updated_at AS product_updated_at,
                   st.total_quantity, st.available_quantity, st.reserved_quantity, st.last_updated
            FROM flash_sales_tb s
            JOIN products_tb p ON p.product_id = s.product_id
            JOIN stocks_tb st ON st.product_id = s.product_id
        "#;

        let row = match sale_id {
            Some(id) => {
                sqlx::query(&format!("{base} WHERE s.sale_id = $1"))
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
            }
            None => {
                sqlx::query(&format!(
                    "{base} WHERE s.start_time <= $1 AND s.end_time >= $1 ORDER BY s.start_time DESC LIMIT 1"
                ))
                .bind(now)
                .fetch_optional(pool)
                .await?
            }
        };

        row.map(|r| row_to_bundle(&r)).transpose()
    }

    /// Ticker transition: upcoming sales whose window has opened.
    pub async fn mark_active_due(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<SaleId>, PurchaseError> {
        let rows = sqlx::query(
            r#"
            UPDATE flash_sales_tb
            SET status = $2, updated_at = NOW()
            WHERE status = $3 AND start_time <= $1 AND end_time >= $1
            RETURNING sale_id
            "#,
        )
        .bind(now)
        .bind(SaleStatus::Active.id())
        .bind(SaleStatus::Upcoming.id())
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("sale_id")).collect())
    }

    /// Ticker transition: any non-ended sale whose window has closed.
    /// `ended` is terminal; this statement never moves a sale backwards.
    pub async fn mark_ended_due(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<SaleId>, PurchaseError> {
        let rows = sqlx::query(
            r#"
            UPDATE flash_sales_tb
            SET status = $2, updated_at = NOW()
            WHERE status <> $2 AND end_time < $1
            RETURNING sale_id
            "#,
        )
        .bind(now)
        .bind(SaleStatus::Ended.id())
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("sale_id")).collect())
    }
}

fn row_to_sale(row: &PgRow) -> Result<FlashSale, PurchaseError> {
    let status_id: i16 = row.get("status");
    let status = SaleStatus::from_id(status_id)
        .ok_or_else(|| PurchaseError::Internal(format!("invalid sale status id: {}", status_id)))?;

    Ok(FlashSale {
        sale_id: row.get("sale_id"),
        product_id: row.get("product_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_bundle(row: &PgRow) -> Result<SaleBundle, PurchaseError> {
    let sale = row_to_sale(row)?;
    let product = row_to_product(row, "product_");
    let level = StockLevel::from_parts(
        row.get("total_quantity"),
        row.get("available_quantity"),
        row.get("reserved_quantity"),
    )
    .map_err(|e| PurchaseError::InvariantViolation(e.to_string()))?;

    Ok(SaleBundle {
        product: Product {
            product_id: sale.product_id,
            ..product
        },
        stock: StockRow {
            product_id: sale.product_id,
            level,
            last_updated: row.get("last_updated"),
        },
        sale,
    })
}
