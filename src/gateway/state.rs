use std::sync::Arc;

use crate::admission::AdmissionGateway;
use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::coord::CoordStore;
use crate::db::Database;
use crate::queue::JobQueue;
use crate::sale::SaleService;
use crate::stats::StatsAggregator;
use crate::status::StatusService;
use crate::stock::StockManager;

/// Gateway application state (shared)
pub struct AppState {
    pub config: AppConfig,
    /// PostgreSQL durable store
    pub db: Database,
    /// Coordination store (Redis or in-memory)
    pub coord: Arc<dyn CoordStore>,
    /// Job queue provider
    pub queue: Arc<dyn JobQueue>,
    /// Purchase admission front-end
    pub admission: Arc<AdmissionGateway>,
    /// Sale status read path
    pub sales: Arc<SaleService>,
    /// Per-user / per-job status reads
    pub status: StatusService,
    /// Order/stock aggregation
    pub stats: StatsAggregator,
    /// Stock operations (mock seed surface)
    pub stock: StockManager,
    /// Token issue/verify
    pub auth: AuthService,
}
