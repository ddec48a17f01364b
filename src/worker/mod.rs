//! Purchase Worker Pool
//!
//! A fixed pool of workers leasing jobs off the queue and running the
//! purchase transaction:
//!
//! 1. mark job + user state `processing`
//! 2. load the sale uncached and re-validate the window against the clock
//! 3. reserve one unit of stock (oversell gate)
//! 4. insert the order row (UNIQUE(user, product) backstop)
//! 5. confirm the reservation
//! 6. confirm the order row
//! 7. finalize job + user state
//! 8. invalidate the sale-status cache
//!
//! Between 3 and 5 a reservation marker (`stock_hold:<jobId>`) records the
//! outstanding claim so that stalled-lease recovery and transient-failure
//! retries can release it exactly once. Because delivery is at-least-once,
//! a re-run that finds its own pending order resumes it instead of
//! double-purchasing; a confirmed order is the genuine duplicate and
//! triggers compensation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::coord::{self, CoordStore, keys};
use crate::core_types::{JobId, OrderId, ProductId, UserId};
use crate::error::{PurchaseError, REASON_MAX_ATTEMPTS};
use crate::orders::{InsertOutcome, Order, OrderRepository, OrderStatus};
use crate::queue::{JobQueue, JobRecord};
use crate::sale::SaleService;
use crate::status::UserPurchaseState;
use crate::stock::StockManager;

/// Configuration for the purchase worker pool
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Idle sleep between empty lease attempts
    pub poll_interval: Duration,
    /// How often the janitor scans for expired leases
    pub janitor_interval: Duration,
    /// TTL on reservation markers (safety net well above the lease)
    pub hold_ttl: Duration,
    /// TTL for per-user purchase state writes
    pub user_state_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_millis(100),
            janitor_interval: Duration::from_secs(5),
            hold_ttl: Duration::from_secs(600),
            user_state_ttl: Duration::from_secs(1800),
        }
    }
}

/// Reservation marker stored at `stock_hold:<jobId>` while a claim on a
/// stock unit is outstanding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockHold {
    product_id: ProductId,
    qty: i64,
}

pub struct PurchaseWorkerPool {
    pool: PgPool,
    coord: Arc<dyn CoordStore>,
    queue: Arc<dyn JobQueue>,
    stock: StockManager,
    sales: Arc<SaleService>,
    config: WorkerConfig,
}

impl PurchaseWorkerPool {
    pub fn new(
        pool: PgPool,
        coord: Arc<dyn CoordStore>,
        queue: Arc<dyn JobQueue>,
        stock: StockManager,
        sales: Arc<SaleService>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            pool,
            coord,
            queue,
            stock,
            sales,
            config,
        }
    }

    /// Spawn the worker loops and the janitor. Tasks drain on shutdown.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.config.concurrency + 1);

        for worker_id in 0..self.config.concurrency {
            let pool = Arc::clone(&self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                pool.worker_loop(worker_id, shutdown).await;
            }));
        }

        let janitor = Arc::clone(&self);
        handles.push(tokio::spawn(async move {
            janitor.janitor_loop(shutdown).await;
        }));

        info!(concurrency = self.config.concurrency, "Purchase worker pool started");
        handles
    }

    async fn worker_loop(&self, worker_id: usize, shutdown: watch::Receiver<bool>) {
        debug!(worker_id, "Worker started");
        loop {
            if *shutdown.borrow() {
                debug!(worker_id, "Worker stopping");
                return;
            }

            match self.queue.lease_next().await {
                Ok(Some(job)) => self.handle_job(job).await,
                Ok(None) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(worker_id, error = %e, "Lease attempt failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Run a single leased job to a queue-visible outcome.
    pub async fn handle_job(&self, job: JobRecord) {
        let job_id = job.job_id;
        let user_id = job.payload.user_id;

        self.set_user_state(user_id, UserPurchaseState::processing(job_id))
            .await;

        match self.run_purchase(&job).await {
            Ok(order_id) => {
                if let Err(e) = self.queue.complete(job_id, order_id).await {
                    error!(%job_id, error = %e, "Failed to mark job completed");
                }
                self.set_user_state(user_id, UserPurchaseState::completed(job_id, order_id))
                    .await;
                self.sales.invalidate(job.payload.sale_id).await;
                info!(%job_id, %user_id, %order_id, "Purchase completed");
            }
            Err(e) if e.is_transient() => {
                // Start the next attempt from a clean slate: any
                // outstanding reservation goes back to available.
                self.release_hold(job_id).await;

                if job.retries_exhausted() {
                    warn!(%job_id, error = %e, attempts = job.attempts_made, "Retries exhausted");
                    self.fail_job(&job, REASON_MAX_ATTEMPTS).await;
                } else {
                    let delay = job.backoff_delay() + jitter();
                    debug!(%job_id, error = %e, delay_ms = delay.as_millis() as u64, "Transient failure, retrying");
                    if let Err(retry_err) =
                        self.queue.retry_later(job_id, delay, e.code()).await
                    {
                        error!(%job_id, error = %retry_err, "Failed to schedule retry");
                    }
                    // The user keeps seeing `processing` while the retry
                    // waits; only terminal outcomes change their state.
                }
            }
            Err(e) => {
                debug!(%job_id, %user_id, reason = e.code(), "Purchase failed");
                self.release_hold(job_id).await;
                self.fail_job(&job, e.code()).await;
            }
        }
    }

    /// The purchase transaction proper. Any `Err` leaves compensation to
    /// the caller via the reservation marker.
    async fn run_purchase(&self, job: &JobRecord) -> Result<OrderId, PurchaseError> {
        let payload = &job.payload;

        // Commit-path validation reads around the cache on purpose.
        let bundle = self
            .sales
            .load_uncached(Some(payload.sale_id))
            .await?
            .ok_or(PurchaseError::SaleNotActive)?;
        if !bundle.sale.is_active_at(chrono::Utc::now()) {
            return Err(PurchaseError::SaleNotActive);
        }
        let product_id = bundle.product.product_id;

        self.stock.reserve(product_id, 1).await?;
        if let Err(e) = self.write_hold(job.job_id, product_id).await {
            // Without the marker a crash would leak the reservation, so
            // undo it and let the retry start over.
            warn!(job_id = %job.job_id, error = %e, "Failed to record stock hold, releasing");
            self.stock.release(product_id, 1).await?;
            return Err(e);
        }

        let order =
            match OrderRepository::insert_pending(&self.pool, payload.user_id, product_id).await? {
                InsertOutcome::Inserted(order) => order,
                InsertOutcome::Duplicate(existing) => match existing.status {
                    // A previous attempt died between insert and confirm;
                    // adopt the pending row and finish the job.
                    OrderStatus::Pending => {
                        debug!(job_id = %job.job_id, order_id = %existing.order_id, "Resuming pending order from earlier attempt");
                        existing
                    }
                    OrderStatus::Confirmed | OrderStatus::Failed => {
                        self.release_hold(job.job_id).await;
                        return Err(PurchaseError::AlreadyPurchased);
                    }
                },
            };

        if let Err(e) = self.stock.confirm(product_id, 1).await {
            match e {
                PurchaseError::InvariantViolation(_) => {
                    // The reservation is gone; roll the order back rather
                    // than confirm a unit that was never claimed.
                    let _ = OrderRepository::fail(&self.pool, order.order_id).await;
                    self.delete_hold(job.job_id).await;
                    return Err(e);
                }
                other => return Err(other),
            }
        }

        self.finish_order(job.job_id, &order).await?;
        Ok(order.order_id)
    }

    async fn finish_order(&self, job_id: JobId, order: &Order) -> Result<(), PurchaseError> {
        OrderRepository::confirm(&self.pool, order.order_id).await?;
        self.delete_hold(job_id).await;
        Ok(())
    }

    async fn fail_job(&self, job: &JobRecord, reason: &str) {
        if let Err(e) = self.queue.fail(job.job_id, reason).await {
            error!(job_id = %job.job_id, error = %e, "Failed to mark job failed");
        }
        self.set_user_state(
            job.payload.user_id,
            UserPurchaseState::failed(job.job_id, reason),
        )
        .await;
    }

    async fn janitor_loop(&self, shutdown: watch::Receiver<bool>) {
        debug!("Queue janitor started");
        loop {
            if *shutdown.borrow() {
                debug!("Queue janitor stopping");
                return;
            }

            if let Err(e) = self.recover_stalled().await {
                error!(error = %e, "Stalled-job scan failed");
            }

            tokio::time::sleep(self.config.janitor_interval).await;
        }
    }

    /// One stalled-lease recovery pass with release-on-expiry: a worker
    /// that died after reserving left a marker; the unit goes back to
    /// available before the job becomes leasable again. Returns how many
    /// jobs were requeued.
    pub async fn recover_stalled(&self) -> Result<usize, PurchaseError> {
        let stalled = self.queue.reap_expired_leases().await?;
        let mut recovered = 0;

        for record in stalled {
            warn!(job_id = %record.job_id, attempts = record.attempts_made, "Recovering stalled job");
            self.release_hold(record.job_id).await;
            if let Err(e) = self.queue.requeue(record.job_id).await {
                error!(job_id = %record.job_id, error = %e, "Failed to requeue stalled job");
            } else {
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Recovered stalled jobs this scan");
        }
        Ok(recovered)
    }

    async fn write_hold(&self, job_id: JobId, product_id: ProductId) -> Result<(), PurchaseError> {
        let hold = StockHold { product_id, qty: 1 };
        coord::set_json(
            self.coord.as_ref(),
            &keys::stock_hold(job_id),
            &hold,
            self.config.hold_ttl,
        )
        .await
    }

    /// Release an outstanding reservation, exactly once per marker.
    /// Errors are logged, not propagated: a failed release keeps the
    /// marker so a later pass can try again.
    async fn release_hold(&self, job_id: JobId) {
        let key = keys::stock_hold(job_id);
        let hold: Option<StockHold> = match coord::get_json(self.coord.as_ref(), &key).await {
            Ok(h) => h,
            Err(e) => {
                error!(%job_id, error = %e, "Failed to read stock hold");
                return;
            }
        };
        let Some(hold) = hold else { return };

        match self.stock.release(hold.product_id, hold.qty).await {
            Ok(_) => self.delete_hold(job_id).await,
            Err(e) => {
                error!(%job_id, product_id = %hold.product_id, error = %e, "Failed to release reserved stock");
            }
        }
    }

    async fn delete_hold(&self, job_id: JobId) {
        if let Err(e) = self.coord.del(&keys::stock_hold(job_id)).await {
            warn!(%job_id, error = %e, "Failed to drop stock hold marker");
        }
    }

    async fn set_user_state(&self, user_id: UserId, state: UserPurchaseState) {
        if let Err(e) = coord::set_json(
            self.coord.as_ref(),
            &keys::purchase_status(user_id),
            &state,
            self.config.user_state_ttl,
        )
        .await
        {
            error!(%user_id, error = %e, "Failed to write user purchase state");
        }
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..500))
}
