//! Pipeline integration tests over the in-memory providers
//!
//! Everything here runs without external services: the coordination
//! store and the job queue are the in-memory implementations, and the
//! sale feed is a fixed snapshot. The database-backed purchase
//! transaction is covered by `pg_integration.rs`.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use blitzsale::admission::{AdmissionConfig, AdmissionGateway};
use blitzsale::catalog::models::SaleStatus;
use blitzsale::coord::{self, CoordStore, MemoryCoordStore, keys};
use blitzsale::error::PurchaseError;
use blitzsale::queue::{JobQueue, JobState, MemoryJobQueue};
use blitzsale::sale::{SaleReader, SaleSnapshot};
use blitzsale::status::{StatusService, UserPurchaseState};

struct StaticSaleReader {
    snapshot: SaleSnapshot,
}

#[async_trait]
impl SaleReader for StaticSaleReader {
    async fn status_snapshot(
        &self,
        _sale_id: Option<blitzsale::SaleId>,
    ) -> Result<Option<SaleSnapshot>, PurchaseError> {
        Ok(Some(self.snapshot.clone()))
    }
}

fn active_snapshot() -> SaleSnapshot {
    let now = Utc::now();
    SaleSnapshot {
        sale_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        name: "Limited Widget".into(),
        description: "One per customer".into(),
        price: Decimal::new(49999, 2),
        image_url: None,
        status: SaleStatus::Active,
        start_time: now - chrono::Duration::minutes(1),
        end_time: now + chrono::Duration::minutes(30),
        time_until_start: 0,
        time_until_end: 1800,
        total_quantity: 100,
        available_quantity: 100,
        sold_quantity: 0,
    }
}

struct Harness {
    coord: Arc<MemoryCoordStore>,
    queue: Arc<MemoryJobQueue>,
    admission: AdmissionGateway,
    status: StatusService,
}

fn harness(lease: Duration) -> Harness {
    let coord = Arc::new(MemoryCoordStore::new());
    let queue = Arc::new(MemoryJobQueue::new(
        coord.clone() as Arc<dyn CoordStore>,
        lease,
        Duration::from_secs(3600),
    ));
    let admission = AdmissionGateway::new(
        coord.clone(),
        queue.clone(),
        Arc::new(StaticSaleReader {
            snapshot: active_snapshot(),
        }),
        AdmissionConfig::default(),
    );
    let status = StatusService::new(coord.clone());
    Harness {
        coord,
        queue,
        admission,
        status,
    }
}

/// Write the worker-side user state the way the pool does.
async fn set_user_state(coord: &MemoryCoordStore, user_id: Uuid, state: &UserPurchaseState) {
    coord::set_json(
        coord,
        &keys::purchase_status(user_id),
        state,
        Duration::from_secs(1800),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn admitted_job_is_observable_through_status_reads() {
    let h = harness(Duration::from_secs(30));
    let user_id = Uuid::new_v4();

    let ticket = h.admission.admit(user_id, None).await.unwrap();
    assert_eq!(ticket.status, JobState::Queued);

    // Client polls right after the 202.
    let user_state = h.status.user_status(user_id).await.unwrap().unwrap();
    assert_eq!(user_state.status, JobState::Queued);
    assert_eq!(user_state.job_id, ticket.job_id);

    let job = h.status.job_status(ticket.job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.payload.user_id, user_id);
}

#[tokio::test]
async fn status_never_reverts_after_terminal_state() {
    let h = harness(Duration::from_secs(30));
    let user_id = Uuid::new_v4();
    let ticket = h.admission.admit(user_id, None).await.unwrap();

    // Worker picks the job up and finishes it.
    let leased = h.queue.lease_next().await.unwrap().unwrap();
    assert_eq!(leased.job_id, ticket.job_id);
    let order_id = Uuid::new_v4();
    h.queue.complete(ticket.job_id, order_id).await.unwrap();
    set_user_state(
        &h.coord,
        user_id,
        &UserPurchaseState::completed(ticket.job_id, order_id),
    )
    .await;

    // Late queue writes must not undo the terminal state.
    h.queue.fail(ticket.job_id, "OUT_OF_STOCK").await.unwrap();
    h.queue
        .retry_later(ticket.job_id, Duration::from_millis(1), "TRANSIENT")
        .await
        .unwrap();

    let job = h.status.job_status(ticket.job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.success, Some(true));
    assert_eq!(job.order_id, Some(order_id));

    // And nothing new became leasable.
    assert!(h.queue.lease_next().await.unwrap().is_none());
}

#[tokio::test]
async fn completed_purchase_blocks_readmission() {
    let h = harness(Duration::from_secs(30));
    let user_id = Uuid::new_v4();
    let ticket = h.admission.admit(user_id, None).await.unwrap();

    h.queue.lease_next().await.unwrap().unwrap();
    let order_id = Uuid::new_v4();
    h.queue.complete(ticket.job_id, order_id).await.unwrap();
    set_user_state(
        &h.coord,
        user_id,
        &UserPurchaseState::completed(ticket.job_id, order_id),
    )
    .await;

    let err = h.admission.admit(user_id, None).await.unwrap_err();
    assert!(matches!(err, PurchaseError::AlreadyPurchased));
}

#[tokio::test]
async fn failed_purchase_frees_the_admission_slot() {
    let h = harness(Duration::from_secs(30));
    let user_id = Uuid::new_v4();
    let first = h.admission.admit(user_id, None).await.unwrap();

    h.queue.lease_next().await.unwrap().unwrap();
    h.queue.fail(first.job_id, "OUT_OF_STOCK").await.unwrap();
    set_user_state(
        &h.coord,
        user_id,
        &UserPurchaseState::failed(first.job_id, "OUT_OF_STOCK"),
    )
    .await;

    let second = h.admission.admit(user_id, None).await.unwrap();
    assert_ne!(second.job_id, first.job_id);

    let user_state = h.status.user_status(user_id).await.unwrap().unwrap();
    assert_eq!(user_state.status, JobState::Queued);
    assert_eq!(user_state.job_id, second.job_id);
}

#[tokio::test]
async fn stalled_job_survives_worker_death() {
    let h = harness(Duration::from_millis(40));
    let user_id = Uuid::new_v4();
    let ticket = h.admission.admit(user_id, None).await.unwrap();

    // Worker leases the job, then dies silently.
    let leased = h.queue.lease_next().await.unwrap().unwrap();
    assert_eq!(leased.attempts_made, 1);

    tokio::time::sleep(Duration::from_millis(60)).await;

    // Janitor pass: reap, then requeue.
    let stalled = h.queue.reap_expired_leases().await.unwrap();
    assert_eq!(stalled.len(), 1);
    h.queue.requeue(ticket.job_id).await.unwrap();

    // A healthy worker finishes the second attempt.
    let retried = h.queue.lease_next().await.unwrap().unwrap();
    assert_eq!(retried.job_id, ticket.job_id);
    assert_eq!(retried.attempts_made, 2);
    h.queue.complete(ticket.job_id, Uuid::new_v4()).await.unwrap();

    let job = h.status.job_status(ticket.job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
}

#[tokio::test]
async fn burst_of_admissions_from_distinct_users_all_queue() {
    let h = harness(Duration::from_secs(30));
    let admission = Arc::new(h.admission);

    let mut handles = vec![];
    for _ in 0..50 {
        let admission = admission.clone();
        handles.push(tokio::spawn(async move {
            admission.admit(Uuid::new_v4(), None).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.waiting, 50);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn queue_stats_track_the_full_lifecycle() {
    let h = harness(Duration::from_secs(30));

    let a = h.admission.admit(Uuid::new_v4(), None).await.unwrap();
    let b = h.admission.admit(Uuid::new_v4(), None).await.unwrap();
    let stats = h.queue.stats().await.unwrap();
    assert_eq!((stats.waiting, stats.active), (2, 0));

    let first = h.queue.lease_next().await.unwrap().unwrap();
    let stats = h.queue.stats().await.unwrap();
    assert_eq!((stats.waiting, stats.active), (1, 1));

    h.queue.complete(first.job_id, Uuid::new_v4()).await.unwrap();
    let second = h.queue.lease_next().await.unwrap().unwrap();
    h.queue.fail(second.job_id, "SALE_NOT_ACTIVE").await.unwrap();

    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total(), 2);

    // Exactly the two admitted jobs flowed through.
    assert!([a.job_id, b.job_id].contains(&first.job_id));
    assert!([a.job_id, b.job_id].contains(&second.job_id));
}
