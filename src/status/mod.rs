//! Status Service
//!
//! Read path for per-user purchase state and per-job state. Both are pure
//! coordination-store reads with no database fallback: a missing entry
//! means "no purchase in flight" (or an expired job record).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::coord::{self, CoordStore, keys};
use crate::core_types::{JobId, OrderId, UserId};
use crate::error::PurchaseError;
use crate::queue::{JobRecord, JobState};

/// Mirror of a user's most recent purchase job, keyed by user id in the
/// coordination store (TTL 30 min). Written by the admission gateway
/// (initial `queued`) and the worker pool (everything after).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPurchaseState {
    pub status: JobState,
    #[schema(value_type = uuid::Uuid)]
    pub job_id: JobId,
    #[schema(value_type = Option<uuid::Uuid>)]
    pub order_id: Option<OrderId>,
    pub success: Option<bool>,
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl UserPurchaseState {
    pub fn queued(job_id: JobId) -> Self {
        Self {
            status: JobState::Queued,
            job_id,
            order_id: None,
            success: None,
            reason: None,
            updated_at: Utc::now(),
        }
    }

    pub fn processing(job_id: JobId) -> Self {
        Self {
            status: JobState::Processing,
            ..Self::queued(job_id)
        }
    }

    pub fn completed(job_id: JobId, order_id: OrderId) -> Self {
        Self {
            status: JobState::Completed,
            order_id: Some(order_id),
            success: Some(true),
            ..Self::queued(job_id)
        }
    }

    pub fn failed(job_id: JobId, reason: &str) -> Self {
        Self {
            status: JobState::Failed,
            success: Some(false),
            reason: Some(reason.to_string()),
            ..Self::queued(job_id)
        }
    }

    /// A job is still working through the pipeline for this user.
    pub fn is_in_flight(&self) -> bool {
        !self.status.is_terminal()
    }

    /// The user already holds a successful purchase.
    pub fn is_successful_purchase(&self) -> bool {
        self.status == JobState::Completed && self.success == Some(true)
    }
}

/// Read-side service over the coordination store.
pub struct StatusService {
    coord: Arc<dyn CoordStore>,
}

impl StatusService {
    pub fn new(coord: Arc<dyn CoordStore>) -> Self {
        Self { coord }
    }

    pub async fn user_status(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserPurchaseState>, PurchaseError> {
        coord::get_json(self.coord.as_ref(), &keys::purchase_status(user_id)).await
    }

    pub async fn job_status(&self, job_id: JobId) -> Result<Option<JobRecord>, PurchaseError> {
        coord::get_json(self.coord.as_ref(), &keys::purchase_job(job_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_in_flight_detection() {
        let job_id = Uuid::new_v4();
        assert!(UserPurchaseState::queued(job_id).is_in_flight());
        assert!(UserPurchaseState::processing(job_id).is_in_flight());
        assert!(!UserPurchaseState::completed(job_id, Uuid::new_v4()).is_in_flight());
        assert!(!UserPurchaseState::failed(job_id, "OUT_OF_STOCK").is_in_flight());
    }

    #[test]
    fn test_successful_purchase_detection() {
        let job_id = Uuid::new_v4();
        assert!(UserPurchaseState::completed(job_id, Uuid::new_v4()).is_successful_purchase());
        assert!(!UserPurchaseState::failed(job_id, "OUT_OF_STOCK").is_successful_purchase());
        assert!(!UserPurchaseState::queued(job_id).is_successful_purchase());
    }
}
