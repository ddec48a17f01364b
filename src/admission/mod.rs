//! Admission Gateway
//!
//! The synchronous front of the purchase pipeline: validates intent,
//! enforces per-user dedup and the sliding rate limit, enqueues the job
//! and answers 202 with a job id. Admission is not commitment; the
//! worker re-validates everything at commit time.
//!
//! The critical section against concurrent same-user admissions is the
//! set-if-not-exists write of the user purchase state: out of N
//! simultaneous attempts exactly one claims the key, the rest observe a
//! duplicate.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coord::{self, CoordStore, keys};
use crate::core_types::{SaleId, UserId};
use crate::error::PurchaseError;
use crate::queue::{JobOptions, JobQueue, JobState, Priority, PurchasePayload};
use crate::sale::SaleReader;
use crate::status::UserPurchaseState;

/// Admission tunables.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Attempt budget per user per rate window
    pub max_attempts_per_window: i64,
    /// Sliding rate-limit window
    pub rate_window: Duration,
    /// TTL for the per-user purchase state
    pub user_state_ttl: Duration,
    /// Options stamped onto every purchase job
    pub job_options: JobOptions,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_window: 10,
            rate_window: Duration::from_secs(60),
            user_state_ttl: Duration::from_secs(1800),
            job_options: JobOptions::default(),
        }
    }
}

/// What the client gets back with the 202.
#[derive(Debug, Clone)]
pub struct AdmissionTicket {
    pub job_id: crate::core_types::JobId,
    pub status: JobState,
    pub estimated_wait_secs: u64,
}

pub struct AdmissionGateway {
    coord: Arc<dyn CoordStore>,
    queue: Arc<dyn JobQueue>,
    sales: Arc<dyn SaleReader>,
    config: AdmissionConfig,
}

impl AdmissionGateway {
    pub fn new(
        coord: Arc<dyn CoordStore>,
        queue: Arc<dyn JobQueue>,
        sales: Arc<dyn SaleReader>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            coord,
            queue,
            sales,
            config,
        }
    }

    /// Admit a purchase intent for `user_id`, resolving the active sale
    /// when no `sale_id` is given.
    pub async fn admit(
        &self,
        user_id: UserId,
        sale_id: Option<SaleId>,
    ) -> Result<AdmissionTicket, PurchaseError> {
        // 1. Dedup pre-check: an in-flight job or a successful purchase
        //    blocks admission; a terminal failure allows a fresh attempt.
        let state_key = keys::purchase_status(user_id);
        let previous: Option<UserPurchaseState> =
            coord::get_json(self.coord.as_ref(), &state_key).await?;
        let retry_after_failure = match &previous {
            Some(state) if state.is_in_flight() => return Err(PurchaseError::DuplicateInFlight),
            Some(state) if state.is_successful_purchase() => {
                return Err(PurchaseError::AlreadyPurchased);
            }
            Some(_) => true,
            None => false,
        };

        // 2. Rate token: counted even for attempts that end up rejected.
        let attempts = self
            .coord
            .incr(&keys::rate_limit(user_id), self.config.rate_window)
            .await?;
        if attempts > self.config.max_attempts_per_window {
            debug!(%user_id, attempts, "Rate limit exceeded");
            return Err(PurchaseError::TooManyAttempts);
        }

        // 3. Resolve and validate the sale. The worker re-checks against
        //    the uncached read; this check just keeps dead intents out of
        //    the queue.
        let snapshot = self
            .sales
            .status_snapshot(sale_id)
            .await?
            .ok_or(PurchaseError::SaleNotActive)?;
        if !snapshot.is_active() {
            return Err(PurchaseError::SaleNotActive);
        }

        // 4. Claim the per-user slot. set-if-not-exists is the critical
        //    section: exactly one of N concurrent admissions wins.
        let job_id = Uuid::new_v4();
        let queued = UserPurchaseState::queued(job_id);
        let queued_json = serde_json::to_string(&queued)?;
        let claimed = self
            .coord
            .set_nx(&state_key, &queued_json, self.config.user_state_ttl)
            .await?;
        if !claimed {
            if !retry_after_failure {
                return Err(PurchaseError::DuplicateInFlight);
            }
            // The slot still holds the previous terminal failure;
            // overwrite it for the retry.
            self.coord
                .set(&state_key, &queued_json, self.config.user_state_ttl)
                .await?;
        }

        // 5. Enqueue at normal priority. On failure the slot is freed so
        //    the client can retry immediately.
        let payload = PurchasePayload {
            user_id,
            sale_id: snapshot.sale_id,
            enqueued_at: Utc::now(),
        };
        if let Err(e) = self
            .queue
            .add_job(job_id, payload, Priority::Normal, self.config.job_options)
            .await
        {
            warn!(%user_id, %job_id, error = %e, "Enqueue failed, releasing admission slot");
            if let Err(del_err) = self.coord.del(&state_key).await {
                warn!(%user_id, error = %del_err, "Failed to release admission slot");
            }
            return Err(e);
        }

        let estimated_wait_secs = self.estimated_wait().await;
        info!(%user_id, %job_id, sale_id = %snapshot.sale_id, "Purchase admitted");

        Ok(AdmissionTicket {
            job_id,
            status: JobState::Queued,
            estimated_wait_secs,
        })
    }

    /// ~5 s of worker time per job ahead of this one, floored at 5 s.
    async fn estimated_wait(&self) -> u64 {
        match self.queue.stats().await {
            Ok(stats) => (5 * (stats.waiting + stats.active)).max(5),
            Err(e) => {
                warn!(error = %e, "Queue stats unavailable for wait estimate");
                5
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::SaleStatus;
    use crate::coord::MemoryCoordStore;
    use crate::queue::MemoryJobQueue;
    use crate::sale::SaleSnapshot;
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    /// Fixed sale feed standing in for the DB-backed sale service.
    struct StaticSaleReader {
        snapshot: Option<SaleSnapshot>,
    }

    #[async_trait]
    impl SaleReader for StaticSaleReader {
        async fn status_snapshot(
            &self,
            _sale_id: Option<SaleId>,
        ) -> Result<Option<SaleSnapshot>, PurchaseError> {
            Ok(self.snapshot.clone())
        }
    }

    fn active_snapshot() -> SaleSnapshot {
        let now = Utc::now();
        SaleSnapshot {
            sale_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "Limited Widget".into(),
            description: String::new(),
            price: Decimal::new(9999, 2),
            image_url: None,
            status: SaleStatus::Active,
            start_time: now - chrono::Duration::minutes(1),
            end_time: now + chrono::Duration::minutes(10),
            time_until_start: 0,
            time_until_end: 600,
            total_quantity: 100,
            available_quantity: 100,
            sold_quantity: 0,
        }
    }

    fn gateway(
        snapshot: Option<SaleSnapshot>,
        config: AdmissionConfig,
    ) -> (Arc<AdmissionGateway>, Arc<MemoryCoordStore>, Arc<MemoryJobQueue>) {
        let coord = Arc::new(MemoryCoordStore::new());
        let queue = Arc::new(MemoryJobQueue::new(
            coord.clone() as Arc<dyn CoordStore>,
            Duration::from_secs(30),
            Duration::from_secs(3600),
        ));
        let gateway = Arc::new(AdmissionGateway::new(
            coord.clone(),
            queue.clone(),
            Arc::new(StaticSaleReader { snapshot }),
            config,
        ));
        (gateway, coord, queue)
    }

    #[tokio::test]
    async fn test_admit_enqueues_one_job() {
        let (gateway, _, queue) = gateway(Some(active_snapshot()), AdmissionConfig::default());
        let ticket = gateway.admit(Uuid::new_v4(), None).await.unwrap();
        assert_eq!(ticket.status, JobState::Queued);
        assert!(ticket.estimated_wait_secs >= 5);

        let record = queue.get_job(ticket.job_id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Queued);
        assert_eq!(queue.stats().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_second_admit_is_duplicate() {
        let (gateway, _, _) = gateway(Some(active_snapshot()), AdmissionConfig::default());
        let user_id = Uuid::new_v4();
        gateway.admit(user_id, None).await.unwrap();

        let err = gateway.admit(user_id, None).await.unwrap_err();
        assert!(matches!(err, PurchaseError::DuplicateInFlight));
    }

    #[tokio::test]
    async fn test_concurrent_admissions_single_winner() {
        let (gateway, _, queue) = gateway(Some(active_snapshot()), AdmissionConfig::default());
        let user_id = Uuid::new_v4();

        let mut handles = vec![];
        for _ in 0..10 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move { gateway.admit(user_id, None).await }));
        }

        let mut admitted = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(PurchaseError::DuplicateInFlight) => duplicates += 1,
                Err(other) => panic!("unexpected admission error: {other}"),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(duplicates, 9);
        assert_eq!(queue.stats().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_trips() {
        let config = AdmissionConfig {
            max_attempts_per_window: 3,
            ..AdmissionConfig::default()
        };
        // No active sale: every attempt burns a rate token then fails.
        let (gateway, _, _) = gateway(None, config);
        let user_id = Uuid::new_v4();

        for _ in 0..3 {
            let err = gateway.admit(user_id, None).await.unwrap_err();
            assert!(matches!(err, PurchaseError::SaleNotActive));
        }
        let err = gateway.admit(user_id, None).await.unwrap_err();
        assert!(matches!(err, PurchaseError::TooManyAttempts));
    }

    #[tokio::test]
    async fn test_already_purchased_blocks() {
        let (gateway, coord, _) = gateway(Some(active_snapshot()), AdmissionConfig::default());
        let user_id = Uuid::new_v4();
        let done = UserPurchaseState::completed(Uuid::new_v4(), Uuid::new_v4());
        coord::set_json(
            coord.as_ref(),
            &keys::purchase_status(user_id),
            &done,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        let err = gateway.admit(user_id, None).await.unwrap_err();
        assert!(matches!(err, PurchaseError::AlreadyPurchased));
    }

    #[tokio::test]
    async fn test_failed_purchase_allows_retry() {
        let (gateway, coord, _) = gateway(Some(active_snapshot()), AdmissionConfig::default());
        let user_id = Uuid::new_v4();
        let failed = UserPurchaseState::failed(Uuid::new_v4(), "OUT_OF_STOCK");
        coord::set_json(
            coord.as_ref(),
            &keys::purchase_status(user_id),
            &failed,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        let ticket = gateway.admit(user_id, None).await.unwrap();
        assert_eq!(ticket.status, JobState::Queued);
    }

    #[tokio::test]
    async fn test_inactive_sale_rejected() {
        let mut snapshot = active_snapshot();
        snapshot.status = SaleStatus::Upcoming;
        let (gateway, _, queue) = gateway(Some(snapshot), AdmissionConfig::default());

        let err = gateway.admit(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, PurchaseError::SaleNotActive));
        assert_eq!(queue.stats().await.unwrap().waiting, 0);
    }
}
