//! API Response types and DTOs
//!
//! - `ApiResponse<T>`: unified `{success, data?, error?, message?}` wrapper
//! - `ApiResult<T>`: type alias for handler return types
//! - `ApiError`: unified error type with IntoResponse
//!
//! DTOs are the API-layout projections of the storage structs; each
//! entity converts in exactly one place.

use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::admission::AdmissionTicket;
use crate::catalog::models::{Role, User};
use crate::core_types::{JobId, SaleId, UserId};
use crate::error::PurchaseError;
use crate::queue::QueueStats;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - success: whether the request was served
/// - data: payload (present on success; may be null)
/// - error: stable error code (present on failure)
/// - message: human-readable description (present on failure)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "OUT_OF_STOCK")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(code.into()),
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// ApiResult: DRY Type Alias for Handlers
// ============================================================================

/// Type alias for handler return types - reduces boilerplate
pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// Helper to create success response (200 OK)
#[inline]
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// Helper to create accepted response (202 ACCEPTED)
#[inline]
pub fn accepted<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(data))))
}

// ============================================================================
// ApiError: Unified Error Type
// ============================================================================

/// Unified API error with automatic IntoResponse
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ApiResponse::<()>::error(self.code, self.message));
        (self.status, body).into_response()
    }
}

/// Map pipeline errors onto the HTTP surface with their stable codes.
impl From<PurchaseError> for ApiError {
    fn from(err: PurchaseError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.code(), err.to_string())
    }
}

// ============================================================================
// Response DTOs
// ============================================================================

/// 202 body for an admitted purchase intent.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseAccepted {
    pub job_id: JobId,
    #[schema(example = "queued")]
    pub status: String,
    /// Rough seconds until a worker picks the job up
    pub estimated_wait_time: u64,
}

impl From<AdmissionTicket> for PurchaseAccepted {
    fn from(ticket: AdmissionTicket) -> Self {
        Self {
            job_id: ticket.job_id,
            status: ticket.status.as_str().to_string(),
            estimated_wait_time: ticket.estimated_wait_secs,
        }
    }
}

/// Queue depth telemetry as served to admins.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsData {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

impl From<QueueStats> for QueueStatsData {
    fn from(stats: QueueStats) -> Self {
        Self {
            waiting: stats.waiting,
            active: stats.active,
            completed: stats.completed,
            failed: stats.failed,
            total: stats.total(),
        }
    }
}

/// Component states backing the health endpoints.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    #[schema(example = "up")]
    pub database: String,
    #[schema(example = "up")]
    pub coordination_store: String,
    #[schema(example = "up")]
    pub queue: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthData {
    #[schema(example = "healthy")]
    pub status: String,
    pub system: SystemHealth,
}

/// API projection of a user row.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserApi {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserApi {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "shopper@example.com")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserApi,
}

/// Optional sale selector for the status endpoint.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SaleStatusQuery {
    pub sale_id: Option<SaleId>,
}

// ============================================================================
// Mock seed surface (dev/test builds only)
// ============================================================================

#[cfg(feature = "mock-api")]
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeedRequest {
    pub name: Option<String>,
    #[schema(value_type = Option<String>, example = "499.99")]
    pub price: Option<rust_decimal::Decimal>,
    pub total_quantity: i64,
    /// Seconds from now until the window opens (default 0: opens now)
    pub starts_in_secs: Option<i64>,
    /// Window length in seconds (default 3600)
    pub duration_secs: Option<i64>,
    /// Promote (or create) this email as an admin and return its token
    pub admin_email: Option<String>,
}

#[cfg(feature = "mock-api")]
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeedResponse {
    pub product_id: crate::core_types::ProductId,
    pub sale_id: SaleId,
    pub total_quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_success_shape() {
        let response = ApiResponse::success(42);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_envelope_error_shape() {
        let response = ApiResponse::<()>::error("OUT_OF_STOCK", "Product is out of stock");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "OUT_OF_STOCK");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_purchase_error_mapping() {
        let err: ApiError = PurchaseError::TooManyAttempts.into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code, "TOO_MANY_ATTEMPTS");

        let err: ApiError = PurchaseError::DuplicateInFlight.into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }
}
