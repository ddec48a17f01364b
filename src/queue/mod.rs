//! Job Queue
//!
//! At-least-once delivery of purchase jobs with three priority classes,
//! per-job retry budgets, delayed redelivery for transient failures and
//! lease-based stalled-job recovery: a worker holds a job for up to the
//! lease duration, after which the janitor makes it visible again.
//!
//! Because delivery is at-least-once, nothing here deduplicates work; the
//! UNIQUE(user, product) order constraint is the true dedup at commit.
//!
//! Two providers implement the trait: [`memory::MemoryJobQueue`] for
//! single-node dev/tests and [`redis::RedisJobQueue`] for deployments
//! where several worker pools share one queue.

pub mod memory;
pub mod redis;

pub use memory::MemoryJobQueue;
pub use self::redis::RedisJobQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use utoipa::ToSchema;

use crate::core_types::{JobId, OrderId, SaleId, UserId};
use crate::error::PurchaseError;

/// Purchase job lifecycle states
///
/// State IDs are spaced for storage compatibility. Terminal states:
/// COMPLETED (40), FAILED (-10); once terminal a job never transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum JobState {
    /// Accepted by the gateway, waiting for a worker
    Queued = 0,

    /// Leased by a worker, purchase transaction in progress
    Processing = 10,

    /// Terminal: purchase transaction finished (check `success`)
    Completed = 40,

    /// Terminal: business failure or exhausted retries
    Failed = -10,
}

impl JobState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(JobState::Queued),
            10 => Some(JobState::Processing),
            40 => Some(JobState::Completed),
            -10 => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// FIFO priority classes; lower value drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// Purchase job payload as enqueued by the admission gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePayload {
    #[schema(value_type = uuid::Uuid)]
    pub user_id: UserId,
    #[schema(value_type = uuid::Uuid)]
    pub sale_id: SaleId,
    pub enqueued_at: DateTime<Utc>,
}

/// Per-job options set at enqueue time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct JobOptions {
    /// Total attempt budget (first run included)
    pub attempts: u32,
    /// Exponential backoff base for transient retries
    pub backoff_base_ms: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base_ms: 2000,
        }
    }
}

/// A job as tracked in the coordination store (`purchase_job:<jobId>`,
/// TTL-bound), updated by the gateway (queued) and the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[schema(value_type = uuid::Uuid)]
    pub job_id: JobId,
    pub payload: PurchasePayload,
    pub state: JobState,
    pub priority: Priority,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<uuid::Uuid>)]
    pub order_id: Option<OrderId>,
    pub success: Option<bool>,
    pub reason: Option<String>,
}

impl JobRecord {
    pub fn new(job_id: JobId, payload: PurchasePayload, priority: Priority, opts: JobOptions) -> Self {
        Self {
            job_id,
            enqueued_at: payload.enqueued_at,
            payload,
            state: JobState::Queued,
            priority,
            attempts_made: 0,
            max_attempts: opts.attempts,
            backoff_base_ms: opts.backoff_base_ms,
            started_at: None,
            finished_at: None,
            order_id: None,
            success: None,
            reason: None,
        }
    }

    /// Exponential backoff delay for the attempt that just failed.
    pub fn backoff_delay(&self) -> Duration {
        let exp = self.attempts_made.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << exp))
    }

    pub fn retries_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// Queue depth telemetry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.waiting + self.active + self.completed + self.failed
    }
}

/// Pluggable queue provider.
///
/// Workers pull with [`lease_next`](JobQueue::lease_next) rather than
/// registering callbacks; an expired lease makes the job visible again
/// through [`reap_expired_leases`](JobQueue::reap_expired_leases) +
/// [`requeue`](JobQueue::requeue), which the pool's janitor drives so it
/// can run compensation in between.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job under a caller-generated stable id.
    async fn add_job(
        &self,
        job_id: JobId,
        payload: PurchasePayload,
        priority: Priority,
        opts: JobOptions,
    ) -> Result<(), PurchaseError>;

    /// Lease the next visible job, marking it `processing` and counting
    /// the attempt. Returns `None` when nothing is ready.
    async fn lease_next(&self) -> Result<Option<JobRecord>, PurchaseError>;

    /// Terminal success. No-op if the job is already terminal.
    async fn complete(&self, job_id: JobId, order_id: OrderId) -> Result<(), PurchaseError>;

    /// Terminal failure with a stable reason code. No-op if already terminal.
    async fn fail(&self, job_id: JobId, reason: &str) -> Result<(), PurchaseError>;

    /// Transient failure: release the lease and redeliver after `delay`.
    async fn retry_later(
        &self,
        job_id: JobId,
        delay: Duration,
        reason: &str,
    ) -> Result<(), PurchaseError>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobRecord>, PurchaseError>;

    async fn stats(&self) -> Result<QueueStats, PurchaseError>;

    /// Remove expired leases and hand the stalled jobs to the caller.
    /// The jobs stay invisible until [`requeue`](JobQueue::requeue) runs,
    /// giving the janitor a window to release outstanding reservations.
    async fn reap_expired_leases(&self) -> Result<Vec<JobRecord>, PurchaseError>;

    /// Put a reaped job back at the front of its priority class.
    async fn requeue(&self, job_id: JobId) -> Result<(), PurchaseError>;

    async fn ping(&self) -> Result<(), PurchaseError>;

    /// Stop accepting new jobs.
    async fn close(&self) -> Result<(), PurchaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Processing.is_terminal());
    }

    #[test]
    fn test_state_id_roundtrip() {
        for state in [
            JobState::Queued,
            JobState::Processing,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(JobState::from_id(state.id()), Some(state));
        }
        assert!(JobState::from_id(999).is_none());
    }

    #[test]
    fn test_backoff_schedule() {
        let payload = PurchasePayload {
            user_id: uuid::Uuid::new_v4(),
            sale_id: uuid::Uuid::new_v4(),
            enqueued_at: Utc::now(),
        };
        let mut record = JobRecord::new(
            uuid::Uuid::new_v4(),
            payload,
            Priority::Normal,
            JobOptions::default(),
        );

        record.attempts_made = 1;
        assert_eq!(record.backoff_delay(), Duration::from_secs(2));
        record.attempts_made = 2;
        assert_eq!(record.backoff_delay(), Duration::from_secs(4));
        record.attempts_made = 3;
        assert_eq!(record.backoff_delay(), Duration::from_secs(8));
        assert!(record.retries_exhausted());
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(Priority::ALL[0], Priority::High);
        assert_eq!(Priority::Normal.index(), 1);
    }
}
