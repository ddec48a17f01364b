//! blitzsale - Flash-Sale Purchase Processor
//!
//! Service entry point. Architecture:
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌──────────────┐
//! │ Gateway  │──▶│ Admission │──▶│  Queue  │──▶│ Worker Pool  │
//! │ (axum)   │   │ dedup/rate│   │ leases  │   │ reserve →    │
//! └──────────┘   └───────────┘   └─────────┘   │ order →      │
//!      │               │              ▲        │ confirm      │
//!      ▼               ▼              │        └──────┬───────┘
//! ┌──────────┐   ┌──────────────────────┐             ▼
//! │ Sale /   │   │  Coordination store  │      ┌──────────────┐
//! │ Status   │◀──│  (Redis / memory)    │      │  PostgreSQL  │
//! └──────────┘   └──────────────────────┘      └──────────────┘
//! ```

use std::sync::Arc;

use blitzsale::admission::{AdmissionConfig, AdmissionGateway};
use blitzsale::auth::AuthService;
use blitzsale::config::AppConfig;
use blitzsale::coord::{CoordStore, MemoryCoordStore, RedisCoordStore};
use blitzsale::db::{Database, schema};
use blitzsale::gateway::{self, state::AppState};
use blitzsale::queue::{JobOptions, JobQueue, MemoryJobQueue, RedisJobQueue};
use blitzsale::sale::SaleService;
use blitzsale::sale::lifecycle::{LifecycleTicker, TickerConfig};
use blitzsale::stats::StatsAggregator;
use blitzsale::status::StatusService;
use blitzsale::stock::StockManager;
use blitzsale::supervisor::Supervisor;
use blitzsale::worker::{PurchaseWorkerPool, WorkerConfig};
use blitzsale::{logging, sale::SaleReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let _log_guard = logging::init_logging(&config);

    tracing::info!(port = config.http_port, "Starting blitzsale");

    // [1] Durable store
    let db = Database::connect(&config.database_url, config.db_max_connections).await?;
    schema::init_schema(db.pool()).await?;

    // [2] Coordination store + queue provider
    let (coord, queue): (Arc<dyn CoordStore>, Arc<dyn JobQueue>) = match &config.redis_url {
        Some(url) => {
            let store = RedisCoordStore::connect(url).await?;
            let queue = RedisJobQueue::new(store.connection(), config.job_lease, config.job_ttl);
            (Arc::new(store), Arc::new(queue))
        }
        None => {
            tracing::warn!(
                "REDIS_URL not set - using in-memory coordination store and queue (single-node mode)"
            );
            let store = Arc::new(MemoryCoordStore::new());
            let queue = MemoryJobQueue::new(
                store.clone() as Arc<dyn CoordStore>,
                config.job_lease,
                config.job_ttl,
            );
            (store, Arc::new(queue))
        }
    };

    // [3] Services
    let stock = StockManager::new(db.pool().clone());
    let sales = Arc::new(SaleService::new(
        db.pool().clone(),
        coord.clone(),
        config.sale_cache_ttl,
    ));
    let admission = Arc::new(AdmissionGateway::new(
        coord.clone(),
        queue.clone(),
        sales.clone() as Arc<dyn SaleReader>,
        AdmissionConfig {
            max_attempts_per_window: config.max_attempts_per_minute,
            rate_window: config.rate_window,
            user_state_ttl: config.user_state_ttl,
            job_options: JobOptions {
                attempts: config.job_attempts,
                backoff_base_ms: config.backoff_base.as_millis() as u64,
            },
        },
    ));
    let status = StatusService::new(coord.clone());
    let stats = StatsAggregator::new(
        db.pool().clone(),
        coord.clone(),
        stock.clone(),
        config.stats_cache_ttl,
    );
    let auth = AuthService::new(config.jwt_secret.clone());

    // [4] Background tasks: worker pool + lifecycle ticker
    let worker_pool = Arc::new(PurchaseWorkerPool::new(
        db.pool().clone(),
        coord.clone(),
        queue.clone(),
        stock.clone(),
        sales.clone(),
        WorkerConfig {
            concurrency: config.worker_concurrency,
            user_state_ttl: config.user_state_ttl,
            ..WorkerConfig::default()
        },
    ));
    let ticker = LifecycleTicker::new(
        db.pool().clone(),
        sales.clone(),
        TickerConfig {
            interval: config.ticker_interval,
        },
    );
    let supervisor = Supervisor::start(worker_pool, ticker);

    // [5] HTTP gateway
    let http_port = config.http_port;
    let state = Arc::new(AppState {
        config,
        db,
        coord,
        queue: queue.clone(),
        admission,
        sales,
        status,
        stats,
        stock,
        auth,
    });

    // The server exits on Ctrl-C (or an explicit supervisor shutdown);
    // the background tasks drain after it.
    gateway::run_server(state, http_port, supervisor.subscribe()).await?;

    queue.close().await.ok();
    supervisor.shutdown().await;
    Ok(())
}
