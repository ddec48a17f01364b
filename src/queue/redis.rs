//! Redis-backed job queue
//!
//! The deployment provider: waiting lists, the delayed set and the lease
//! hash all live in Redis, so any number of worker pools can drain one
//! queue. Job records share the `purchase_job:<jobId>` keyspace with the
//! coordination store, keeping the status read path provider-agnostic.
//!
//! Layout:
//! ```text
//! queue:waiting:{high,normal,low}   LPUSH / RPOP lists (FIFO per class)
//! queue:delayed                     ZSET, score = visible-at epoch ms
//! queue:leases                      HASH jobId -> lease deadline epoch ms
//! queue:count:{completed,failed}    counters
//! ```

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{JobOptions, JobQueue, JobRecord, JobState, Priority, PurchasePayload, QueueStats};
use crate::coord::keys;
use crate::core_types::{JobId, OrderId};
use crate::error::PurchaseError;

const DELAYED_KEY: &str = "queue:delayed";
const LEASES_KEY: &str = "queue:leases";
const COMPLETED_KEY: &str = "queue:count:completed";
const FAILED_KEY: &str = "queue:count:failed";

fn waiting_key(priority: Priority) -> String {
    format!("queue:waiting:{}", priority.as_str())
}

pub struct RedisJobQueue {
    conn: ConnectionManager,
    lease_ttl: Duration,
    job_ttl: Duration,
    closed: AtomicBool,
}

impl RedisJobQueue {
    pub fn new(conn: ConnectionManager, lease_ttl: Duration, job_ttl: Duration) -> Self {
        Self {
            conn,
            lease_ttl,
            job_ttl,
            closed: AtomicBool::new(false),
        }
    }

    async fn load(&self, job_id: JobId) -> Result<Option<JobRecord>, PurchaseError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(keys::purchase_job(job_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &JobRecord) -> Result<(), PurchaseError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                keys::purchase_job(record.job_id),
                serde_json::to_string(record)?,
                self.job_ttl.as_secs().max(1),
            )
            .await?;
        Ok(())
    }

    /// Move due delayed jobs back onto their waiting lists.
    async fn promote_delayed(&self) -> Result<(), PurchaseError> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn.zrangebyscore(DELAYED_KEY, 0, now_ms).await?;

        for raw_id in due {
            let removed: i64 = conn.zrem(DELAYED_KEY, &raw_id).await?;
            if removed == 0 {
                // Another node promoted it first.
                continue;
            }
            let Ok(job_id) = raw_id.parse::<JobId>() else {
                continue;
            };
            if let Some(record) = self.load(job_id).await? {
                let _: () = conn.lpush(waiting_key(record.priority), raw_id).await?;
            }
        }
        Ok(())
    }

    async fn finalize(
        &self,
        job_id: JobId,
        counter_key: &str,
        apply: impl FnOnce(&mut JobRecord) + Send,
    ) -> Result<(), PurchaseError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(LEASES_KEY, job_id.to_string()).await?;

        let Some(mut record) = self.load(job_id).await? else {
            return Ok(());
        };
        // Job terminal monotonicity: completed/failed never transition.
        if record.state.is_terminal() {
            return Ok(());
        }
        apply(&mut record);
        record.finished_at = Some(Utc::now());
        self.save(&record).await?;

        let _: i64 = conn.incr(counter_key, 1).await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
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

        let mut conn = self.conn.clone();
        let _: () = conn.lpush(waiting_key(priority), job_id.to_string()).await?;
        Ok(())
    }

    async fn lease_next(&self) -> Result<Option<JobRecord>, PurchaseError> {
        self.promote_delayed().await?;

        let mut conn = self.conn.clone();
        for priority in Priority::ALL {
            loop {
                let raw_id: Option<String> = conn.rpop(waiting_key(priority), None).await?;
                let Some(raw_id) = raw_id else { break };
                let Ok(job_id) = raw_id.parse::<JobId>() else {
                    continue;
                };
                // Records can expire while their id still sits in a list.
                let Some(mut record) = self.load(job_id).await? else {
                    continue;
                };
                if record.state.is_terminal() {
                    continue;
                }

                let now = Utc::now();
                record.state = JobState::Processing;
                record.attempts_made += 1;
                record.started_at = Some(now);
                self.save(&record).await?;

                let deadline_ms = (now + self.lease_ttl).timestamp_millis();
                let _: () = conn.hset(LEASES_KEY, raw_id, deadline_ms).await?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn complete(&self, job_id: JobId, order_id: OrderId) -> Result<(), PurchaseError> {
        self.finalize(job_id, COMPLETED_KEY, |record| {
            record.state = JobState::Completed;
            record.success = Some(true);
            record.order_id = Some(order_id);
        })
        .await
    }

    async fn fail(&self, job_id: JobId, reason: &str) -> Result<(), PurchaseError> {
        let reason = reason.to_string();
        self.finalize(job_id, FAILED_KEY, move |record| {
            record.state = JobState::Failed;
            record.success = Some(false);
            record.reason = Some(reason);
        })
        .await
    }

    async fn retry_later(
        &self,
        job_id: JobId,
        delay: Duration,
        reason: &str,
    ) -> Result<(), PurchaseError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(LEASES_KEY, job_id.to_string()).await?;

        let Some(mut record) = self.load(job_id).await? else {
            return Ok(());
        };
        if record.state.is_terminal() {
            return Ok(());
        }
        record.state = JobState::Queued;
        record.reason = Some(reason.to_string());
        self.save(&record).await?;

        let visible_at_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let _: () = conn
            .zadd(DELAYED_KEY, job_id.to_string(), visible_at_ms)
            .await?;
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobRecord>, PurchaseError> {
        self.load(job_id).await
    }

    async fn stats(&self) -> Result<QueueStats, PurchaseError> {
        let mut conn = self.conn.clone();
        let mut waiting: u64 = 0;
        for priority in Priority::ALL {
            let len: u64 = conn.llen(waiting_key(priority)).await?;
            waiting += len;
        }
        let delayed: u64 = conn.zcard(DELAYED_KEY).await?;
        let active: u64 = conn.hlen(LEASES_KEY).await?;
        let completed: Option<u64> = conn.get(COMPLETED_KEY).await?;
        let failed: Option<u64> = conn.get(FAILED_KEY).await?;

        Ok(QueueStats {
            waiting: waiting + delayed,
            active,
            completed: completed.unwrap_or(0),
            failed: failed.unwrap_or(0),
        })
    }

    async fn reap_expired_leases(&self) -> Result<Vec<JobRecord>, PurchaseError> {
        let mut conn = self.conn.clone();
        let leases: Vec<(String, i64)> = conn.hgetall(LEASES_KEY).await?;
        let now_ms = Utc::now().timestamp_millis();

        let mut stalled = Vec::new();
        for (raw_id, deadline_ms) in leases {
            if deadline_ms >= now_ms {
                continue;
            }
            let removed: i64 = conn.hdel(LEASES_KEY, &raw_id).await?;
            if removed == 0 {
                // Another janitor reaped it first.
                continue;
            }
            let Ok(job_id) = raw_id.parse::<JobId>() else {
                continue;
            };
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

        // Front of the class: RPUSH faces the RPOP end.
        let mut conn = self.conn.clone();
        let _: () = conn
            .rpush(waiting_key(record.priority), job_id.to_string())
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), PurchaseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PurchaseError::Queue("queue is closed".into()));
        }
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), PurchaseError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
