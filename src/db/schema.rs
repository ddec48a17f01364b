//! Postgres schema bootstrap
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` statements executed at startup.
//! The `orders_tb` unique index on (user_id, product_id) is the race-safe
//! backstop against double purchase and must never be dropped.

use anyhow::Result;
use sqlx::PgPool;

/// Initialize the Postgres schema for the purchase pipeline
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing Postgres schema...");

    for (name, ddl) in [
        ("users", CREATE_USERS_TABLE),
        ("users email index", CREATE_USERS_EMAIL_INDEX),
        ("products", CREATE_PRODUCTS_TABLE),
        ("stocks", CREATE_STOCKS_TABLE),
        ("flash_sales", CREATE_FLASH_SALES_TABLE),
        ("flash_sales window index", CREATE_FLASH_SALES_WINDOW_INDEX),
        ("orders", CREATE_ORDERS_TABLE),
        ("orders dedup index", CREATE_ORDERS_DEDUP_INDEX),
    ] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", name, e))?;
    }

    tracing::info!("Postgres schema initialized successfully");
    Ok(())
}

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users_tb (
    user_id     UUID PRIMARY KEY,
    email       TEXT NOT NULL,
    role        SMALLINT NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

// Case-insensitive uniqueness: auto-registration matches on LOWER(email).
const CREATE_USERS_EMAIL_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS users_tb_email_uq ON users_tb (LOWER(email))
"#;

const CREATE_PRODUCTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS products_tb (
    product_id  UUID PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price       NUMERIC(12,2) NOT NULL,
    image_url   TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

// total_quantity is the pre-sale snapshot and is never mutated by the
// purchase path; sold is derived as total - available - reserved.
const CREATE_STOCKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stocks_tb (
    product_id          UUID PRIMARY KEY REFERENCES products_tb(product_id),
    total_quantity      BIGINT NOT NULL,
    available_quantity  BIGINT NOT NULL,
    reserved_quantity   BIGINT NOT NULL DEFAULT 0,
    last_updated        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (available_quantity >= 0),
    CHECK (reserved_quantity >= 0),
    CHECK (available_quantity + reserved_quantity <= total_quantity)
)
"#;

const CREATE_FLASH_SALES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS flash_sales_tb (
    sale_id     UUID PRIMARY KEY,
    product_id  UUID NOT NULL REFERENCES products_tb(product_id),
    start_time  TIMESTAMPTZ NOT NULL,
    end_time    TIMESTAMPTZ NOT NULL,
    status      SMALLINT NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (end_time > start_time)
)
"#;

const CREATE_FLASH_SALES_WINDOW_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS flash_sales_tb_window_idx
    ON flash_sales_tb (start_time, end_time)
"#;

const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders_tb (
    order_id    UUID PRIMARY KEY,
    user_id     UUID NOT NULL REFERENCES users_tb(user_id),
    product_id  UUID NOT NULL REFERENCES products_tb(product_id),
    status      SMALLINT NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

// The authoritative dedup: at most one order per (user, product), enforced
// even when the same job is processed twice by different workers.
const CREATE_ORDERS_DEDUP_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS orders_tb_user_product_uq
    ON orders_tb (user_id, product_id)
"#;
