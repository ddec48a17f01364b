//! In-memory job queue
//!
//! Single-node provider used when no `REDIS_URL` is configured and by the
//! test suites. Waiting lists and leases are process-local; job records
//! live in the coordination store under `purchase_job:<jobId>` so the
//! status read path is identical across providers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{JobOptions, JobQueue, JobRecord, JobState, Priority, PurchasePayload, QueueStats};
use crate::coord::{self, CoordStore, keys};
use crate::core_types::{JobId, OrderId};
use crate::error::PurchaseError;

pub struct MemoryJobQueue {
    store: Arc<dyn CoordStore>,
    waiting: Mutex<[VecDeque<JobId>; 3]>,
    /// (visible_at, job_id) pairs for delayed redelivery
    delayed: Mutex<Vec<(DateTime<Utc>, JobId)>>,
    /// job_id -> lease deadline
    leases: DashMap<JobId, DateTime<Utc>>,
    lease_ttl: Duration,
    job_ttl: Duration,
    completed_count: AtomicU64,
    failed_count: AtomicU64,
    closed: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new(store: Arc<dyn CoordStore>, lease_ttl: Duration, job_ttl: Duration) -> Self {
        Self {
            store,
            waiting: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            delayed: Mutex::new(Vec::new()),
            leases: DashMap::new(),
            lease_ttl,
            job_ttl,
            completed_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    async fn load(&self, job_id: JobId) -> Result<Option<JobRecord>, PurchaseError> {
        coord::get_json(self.store.as_ref(), &keys::purchase_job(job_id)).await
    }

    async fn save(&self, record: &JobRecord) -> Result<(), PurchaseError> {
        coord::set_json(
            self.store.as_ref(),
            &keys::purchase_job(record.job_id),
            record,
            self.job_ttl,
        )
        .await
    }

    /// Move due delayed jobs to the back of their waiting lists.
    fn promote_delayed(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let mut delayed = self.delayed.lock().unwrap();
        let mut due = Vec::new();
        delayed.retain(|(visible_at, job_id)| {
            if *visible_at <= now {
                due.push(*job_id);
                false
            } else {
                true
            }
        });
        due
    }

    fn pop_next(&self) -> Option<JobId> {
        let mut waiting = self.waiting.lock().unwrap();
        waiting.iter_mut().find_map(|queue| queue.pop_front())
    }

    /// Returns whether the transition applied (false for unknown or
    /// already-terminal jobs).
    async fn finalize(
        &self,
        job_id: JobId,
        apply: impl FnOnce(&mut JobRecord),
    ) -> Result<bool, PurchaseError> {
        self.leases.remove(&job_id);
        let Some(mut record) = self.load(job_id).await? else {
            return Ok(false);
        };
        // Job terminal monotonicity: completed/failed never transition.
        if record.state.is_terminal() {
            return Ok(false);
        }
        apply(&mut record);
        record.finished_at = Some(Utc::now());
        self.save(&record).await?;
        Ok(true)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn add_job(
        &self,
        job_id: JobId,
        payload: PurchasePayload,
        priority: Priority,
        opts: JobOptions,
    ) -> Result<(), PurchaseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PurchaseError::Queue("queue is closed".into()));
        }

        let record = JobRecord::new(job_id, payload, priority, opts);
        self.save(&record).await?;

        let mut waiting = self.waiting.lock().unwrap();
        waiting[priority.index()].push_back(job_id);
        Ok(())
    }

    async fn lease_next(&self) -> Result<Option<JobRecord>, PurchaseError> {
        let now = Utc::now();
        let due = self.promote_delayed(now);
        if !due.is_empty() {
            // Delayed retries re-enter at the back of their class; the
            // record knows its own priority.
            for job_id in due {
                if let Some(record) = self.load(job_id).await? {
                    let mut waiting = self.waiting.lock().unwrap();
                    waiting[record.priority.index()].push_back(job_id);
                }
            }
        }

        // Records can expire from the store while their id still sits in a
        // list; skip those and keep draining.
        while let Some(job_id) = self.pop_next() {
            let Some(mut record) = self.load(job_id).await? else {
                continue;
            };
            if record.state.is_terminal() {
                continue;
            }
            record.state = JobState::Processing;
            record.attempts_made += 1;
            record.started_at = Some(now);
            self.save(&record).await?;
            self.leases.insert(job_id, now + self.lease_ttl);
            return Ok(Some(record));
        }

        Ok(None)
    }

    async fn complete(&self, job_id: JobId, order_id: OrderId) -> Result<(), PurchaseError> {
        let applied = self
            .finalize(job_id, |record| {
                record.state = JobState::Completed;
                record.success = Some(true);
                record.order_id = Some(order_id);
            })
            .await?;
        if applied {
            self.completed_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn fail(&self, job_id: JobId, reason: &str) -> Result<(), PurchaseError> {
        let reason = reason.to_string();
        let applied = self
            .finalize(job_id, move |record| {
                record.state = JobState::Failed;
                record.success = Some(false);
                record.reason = Some(reason);
            })
            .await?;
        if applied {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn retry_later(
        &self,
        job_id: JobId,
        delay: Duration,
        reason: &str,
    ) -> Result<(), PurchaseError> {
        self.leases.remove(&job_id);
        let Some(mut record) = self.load(job_id).await? else {
            return Ok(());
        };
        if record.state.is_terminal() {
            return Ok(());
        }
        record.state = JobState::Queued;
        record.reason = Some(reason.to_string());
        self.save(&record).await?;

        let visible_at =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.delayed.lock().unwrap().push((visible_at, job_id));
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobRecord>, PurchaseError> {
        self.load(job_id).await
    }

    async fn stats(&self) -> Result<QueueStats, PurchaseError> {
        let waiting = {
            let lists = self.waiting.lock().unwrap();
            lists.iter().map(|q| q.len() as u64).sum::<u64>()
                + self.delayed.lock().unwrap().len() as u64
        };
        Ok(QueueStats {
            waiting,
            active: self.leases.len() as u64,
            completed: self.completed_count.load(Ordering::Relaxed),
            failed: self.failed_count.load(Ordering::Relaxed),
        })
    }

    async fn reap_expired_leases(&self) -> Result<Vec<JobRecord>, PurchaseError> {
        let now = Utc::now();
        let expired: Vec<JobId> = self
            .leases
            .iter()
            .filter(|entry| *entry.value() < now)
            .map(|entry| *entry.key())
            .collect();

        let mut stalled = Vec::new();
        for job_id in expired {
            if self.leases.remove(&job_id).is_none() {
                continue;
            }
            if let Some(record) = self.load(job_id).await? {
                if !record.state.is_terminal() {
                    stalled.push(record);
                }
            }
        }
        Ok(stalled)
    }

    async fn requeue(&self, job_id: JobId) -> Result<(), PurchaseError> {
        let Some(mut record) = self.load(job_id).await? else {
            return Ok(());
        };
        if record.state.is_terminal() {
            return Ok(());
        }
        record.state = JobState::Queued;
        self.save(&record).await?;

        // Stalled jobs go to the front: they have been waiting longest.
        let mut waiting = self.waiting.lock().unwrap();
        waiting[record.priority.index()].push_front(job_id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), PurchaseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PurchaseError::Queue("queue is closed".into()));
        }
        self.store.ping().await
    }

    async fn close(&self) -> Result<(), PurchaseError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::MemoryCoordStore;
    use uuid::Uuid;

    fn queue() -> MemoryJobQueue {
        let store = Arc::new(MemoryCoordStore::new());
        MemoryJobQueue::new(store, Duration::from_secs(30), Duration::from_secs(3600))
    }

    fn payload() -> PurchasePayload {
        PurchasePayload {
            user_id: Uuid::new_v4(),
            sale_id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_lease_complete() {
        let queue = queue();
        let job_id = Uuid::new_v4();
        queue
            .add_job(job_id, payload(), Priority::Normal, JobOptions::default())
            .await
            .unwrap();

        let leased = queue.lease_next().await.unwrap().unwrap();
        assert_eq!(leased.job_id, job_id);
        assert_eq!(leased.state, JobState::Processing);
        assert_eq!(leased.attempts_made, 1);

        let order_id = Uuid::new_v4();
        queue.complete(job_id, order_id).await.unwrap();

        let record = queue.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.success, Some(true));
        assert_eq!(record.order_id, Some(order_id));

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn test_priority_drain_order() {
        let queue = queue();
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        queue
            .add_job(low, payload(), Priority::Low, JobOptions::default())
            .await
            .unwrap();
        queue
            .add_job(high, payload(), Priority::High, JobOptions::default())
            .await
            .unwrap();

        assert_eq!(queue.lease_next().await.unwrap().unwrap().job_id, high);
        assert_eq!(queue.lease_next().await.unwrap().unwrap().job_id, low);
    }

    #[tokio::test]
    async fn test_terminal_monotonicity() {
        let queue = queue();
        let job_id = Uuid::new_v4();
        queue
            .add_job(job_id, payload(), Priority::Normal, JobOptions::default())
            .await
            .unwrap();
        queue.lease_next().await.unwrap().unwrap();
        queue.complete(job_id, Uuid::new_v4()).await.unwrap();

        // A late fail must not un-complete the job.
        queue.fail(job_id, "OUT_OF_STOCK").await.unwrap();
        let record = queue.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.success, Some(true));
    }

    #[tokio::test]
    async fn test_retry_later_redelivers_after_delay() {
        let queue = queue();
        let job_id = Uuid::new_v4();
        queue
            .add_job(job_id, payload(), Priority::Normal, JobOptions::default())
            .await
            .unwrap();
        queue.lease_next().await.unwrap().unwrap();
        queue
            .retry_later(job_id, Duration::from_millis(30), "TRANSIENT")
            .await
            .unwrap();

        // Not yet visible
        assert!(queue.lease_next().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let leased = queue.lease_next().await.unwrap().unwrap();
        assert_eq!(leased.job_id, job_id);
        assert_eq!(leased.attempts_made, 2);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reaped_and_requeued() {
        let store = Arc::new(MemoryCoordStore::new());
        let queue = MemoryJobQueue::new(store, Duration::from_millis(20), Duration::from_secs(3600));
        let job_id = Uuid::new_v4();
        queue
            .add_job(job_id, payload(), Priority::Normal, JobOptions::default())
            .await
            .unwrap();
        queue.lease_next().await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let stalled = queue.reap_expired_leases().await.unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].job_id, job_id);

        // Invisible until requeued
        assert!(queue.lease_next().await.unwrap().is_none());
        queue.requeue(job_id).await.unwrap();

        let leased = queue.lease_next().await.unwrap().unwrap();
        assert_eq!(leased.job_id, job_id);
        assert_eq!(leased.attempts_made, 2);
    }

    #[tokio::test]
    async fn test_close_rejects_new_jobs() {
        let queue = queue();
        queue.close().await.unwrap();
        let err = queue
            .add_job(Uuid::new_v4(), payload(), Priority::Normal, JobOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::Queue(_)));
    }
}
