//! Application configuration
//!
//! Everything is read from the environment with sane defaults so a bare
//! `cargo run` against a local Postgres works out of the box. The config
//! value is built once in `main` and passed into each service by
//! construction; there are no process-wide mutable singletons.

use std::time::Duration;

/// Runtime configuration, sourced from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port (`HTTP_PORT`, default 3000)
    pub http_port: u16,
    /// Postgres DSN (`DATABASE_URL`) - required
    pub database_url: String,
    /// Redis URL (`REDIS_URL`) - optional; without it the process runs on
    /// the in-memory coordination store and queue (single-node dev mode)
    pub redis_url: Option<String>,
    /// Max Postgres connections (`DB_MAX_CONNECTIONS`, default 10)
    pub db_max_connections: u32,
    /// HMAC secret for bearer tokens (`JWT_SECRET`)
    pub jwt_secret: String,

    /// Purchase worker pool size (`WORKER_CONCURRENCY`, default 10)
    pub worker_concurrency: usize,
    /// Per-job retry budget (`JOB_ATTEMPTS`, default 3)
    pub job_attempts: u32,
    /// Exponential backoff base (`BACKOFF_BASE_MS`, default 2000)
    pub backoff_base: Duration,
    /// Job lease duration before stalled recovery (`JOB_LEASE_SECS`, default 30)
    pub job_lease: Duration,

    /// Admission rate limit per window (`MAX_ATTEMPTS_PER_MINUTE`, default 10)
    pub max_attempts_per_minute: i64,
    /// Rate-limit window (`RATE_WINDOW_SECS`, default 60)
    pub rate_window: Duration,

    /// Job record TTL in the coordination store (`JOB_TTL_SECS`, default 3600)
    pub job_ttl: Duration,
    /// Per-user purchase state TTL (`USER_STATE_TTL_SECS`, default 1800)
    pub user_state_ttl: Duration,
    /// Sale status cache TTL (`SALE_CACHE_TTL_SECS`, default 30)
    pub sale_cache_ttl: Duration,
    /// Sale stats cache TTL (`STATS_CACHE_TTL_SECS`, default 300)
    pub stats_cache_ttl: Duration,

    /// Lifecycle ticker granularity (`TICKER_INTERVAL_MS`, default 1000)
    pub ticker_interval: Duration,

    // Logging
    pub log_dir: String,
    pub log_file: String,
    pub log_level: String,
    pub rotation: String,
    pub use_json: bool,
    /// Let sqlx/redis client logs through at the base level
    /// (`LOG_BACKENDS`, default off: they are capped at warn)
    pub log_backends: bool,
}

impl AppConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            anyhow::anyhow!("DATABASE_URL is required (e.g. postgres://localhost/blitzsale)")
        })?;

        Ok(Self {
            http_port: env_parse("HTTP_PORT", 3000),
            database_url,
            redis_url: std::env::var("REDIS_URL").ok(),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| "blitzsale-dev-secret".to_string()),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", 10),
            job_attempts: env_parse("JOB_ATTEMPTS", 3),
            backoff_base: Duration::from_millis(env_parse("BACKOFF_BASE_MS", 2000)),
            job_lease: Duration::from_secs(env_parse("JOB_LEASE_SECS", 30)),
            max_attempts_per_minute: env_parse("MAX_ATTEMPTS_PER_MINUTE", 10),
            rate_window: Duration::from_secs(env_parse("RATE_WINDOW_SECS", 60)),
            job_ttl: Duration::from_secs(env_parse("JOB_TTL_SECS", 3600)),
            user_state_ttl: Duration::from_secs(env_parse("USER_STATE_TTL_SECS", 1800)),
            sale_cache_ttl: Duration::from_secs(env_parse("SALE_CACHE_TTL_SECS", 30)),
            stats_cache_ttl: Duration::from_secs(env_parse("STATS_CACHE_TTL_SECS", 300)),
            ticker_interval: Duration::from_millis(env_parse("TICKER_INTERVAL_MS", 1000)),
            log_dir: std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_file: std::env::var("LOG_FILE").unwrap_or_else(|_| "blitzsale.log".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            rotation: std::env::var("LOG_ROTATION").unwrap_or_else(|_| "daily".to_string()),
            use_json: std::env::var("LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false),
            log_backends: std::env::var("LOG_BACKENDS")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false),
        })
    }

    /// A baseline config for unit tests; no environment reads.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            http_port: 3000,
            database_url: "postgres://localhost/blitzsale_test".to_string(),
            redis_url: None,
            db_max_connections: 2,
            jwt_secret: "test-secret".to_string(),
            worker_concurrency: 2,
            job_attempts: 3,
            backoff_base: Duration::from_millis(2000),
            job_lease: Duration::from_secs(30),
            max_attempts_per_minute: 10,
            rate_window: Duration::from_secs(60),
            job_ttl: Duration::from_secs(3600),
            user_state_ttl: Duration::from_secs(1800),
            sale_cache_ttl: Duration::from_secs(30),
            stats_cache_ttl: Duration::from_secs(300),
            ticker_interval: Duration::from_secs(1),
            log_dir: "logs".to_string(),
            log_file: "blitzsale.log".to_string(),
            log_level: "info".to_string(),
            rotation: "never".to_string(),
            use_json: false,
            log_backends: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_default() {
        assert_eq!(env_parse("BLITZSALE_NO_SUCH_VAR", 42u64), 42);
    }
}
