//! blitzsale - Flash-Sale Purchase Processor
//!
//! Accepts many concurrent purchase intents over a bounded inventory,
//! admits at most one item per user, never oversells, and answers in
//! bounded time under thundering-herd load.
//!
//! # Modules
//!
//! - [`core_types`] - Core id aliases (UserId, ProductId, JobId, ...)
//! - [`config`] - Environment-driven runtime configuration
//! - [`error`] - Error taxonomy with stable codes
//! - [`db`] - Postgres pool, schema bootstrap, advisory locks
//! - [`coord`] - Coordination store (Redis / in-memory) and key layout
//! - [`catalog`] - Users, products, flash sales
//! - [`orders`] - Order rows and the UNIQUE(user, product) backstop
//! - [`stock`] - Reserve/confirm/release stock protocol
//! - [`sale`] - Sale status reads, cache, lifecycle ticker
//! - [`queue`] - At-least-once job queue with leases
//! - [`admission`] - Dedup + rate limit + enqueue front-end
//! - [`worker`] - Purchase worker pool and compensation
//! - [`status`] - Per-user and per-job status reads
//! - [`stats`] - Order/stock aggregation
//! - [`auth`] - Bearer-token interface
//! - [`gateway`] - Axum HTTP surface
//! - [`supervisor`] - Background task ownership and shutdown

// Core types - must be first!
pub mod core_types;

// Configuration & plumbing
pub mod config;
pub mod error;
pub mod logging;

// Stores
pub mod coord;
pub mod db;

// Domain
pub mod admission;
pub mod catalog;
pub mod orders;
pub mod queue;
pub mod sale;
pub mod stats;
pub mod status;
pub mod stock;
pub mod worker;

// Edges
pub mod auth;
pub mod gateway;
pub mod supervisor;

// Convenient re-exports at crate root
pub use admission::{AdmissionConfig, AdmissionGateway, AdmissionTicket};
pub use config::AppConfig;
pub use coord::{CoordStore, MemoryCoordStore, RedisCoordStore};
pub use core_types::{JobId, OrderId, ProductId, SaleId, UserId};
pub use db::Database;
pub use error::PurchaseError;
pub use queue::{JobQueue, JobRecord, JobState, MemoryJobQueue, RedisJobQueue};
pub use sale::{SaleService, SaleSnapshot};
pub use stats::StatsAggregator;
pub use status::{StatusService, UserPurchaseState};
pub use stock::{StockLevel, StockManager};
pub use supervisor::Supervisor;
pub use worker::{PurchaseWorkerPool, WorkerConfig};
