//! Purchase pipeline error types
//!
//! Stable error codes accompany every failure: business failures are
//! terminal and surface to the client (synchronously or via status
//! polling), transient failures are retried by the worker pool.

use thiserror::Error;

/// Reason string attached to jobs that exhausted their retry budget.
pub const REASON_MAX_ATTEMPTS: &str = "MAX_ATTEMPTS";

/// Purchase pipeline error taxonomy
///
/// Error codes match the API contract for consistent responses.
#[derive(Error, Debug, Clone)]
pub enum PurchaseError {
    // === Business failures (terminal, never retried) ===
    #[error("Sale is not active")]
    SaleNotActive,

    #[error("Product is out of stock")]
    OutOfStock,

    #[error("User has already purchased this product")]
    AlreadyPurchased,

    #[error("A purchase is already in flight for this user")]
    DuplicateInFlight,

    #[error("Too many purchase attempts, slow down")]
    TooManyAttempts,

    #[error("Stock invariant violated: {0}")]
    InvariantViolation(String),

    // === Request failures ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not authenticated")]
    Unauthorized,

    #[error("Admin role required")]
    Forbidden,

    // === Transient failures (retried up to the attempt budget) ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Coordination store error: {0}")]
    CoordStore(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PurchaseError {
    /// Stable error code for API responses and job failure reasons.
    pub fn code(&self) -> &'static str {
        match self {
            PurchaseError::SaleNotActive => "SALE_NOT_ACTIVE",
            PurchaseError::OutOfStock => "OUT_OF_STOCK",
            PurchaseError::AlreadyPurchased => "ALREADY_PURCHASED",
            PurchaseError::DuplicateInFlight => "DUPLICATE_IN_FLIGHT",
            PurchaseError::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            PurchaseError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            PurchaseError::InvalidRequest(_) => "INVALID_REQUEST",
            PurchaseError::NotFound(_) => "NOT_FOUND",
            PurchaseError::Unauthorized => "UNAUTHORIZED",
            PurchaseError::Forbidden => "FORBIDDEN",
            PurchaseError::Database(_) | PurchaseError::CoordStore(_) | PurchaseError::Queue(_) => {
                "TRANSIENT"
            }
            PurchaseError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code for this error when surfaced synchronously.
    pub fn http_status(&self) -> u16 {
        match self {
            PurchaseError::SaleNotActive
            | PurchaseError::OutOfStock
            | PurchaseError::AlreadyPurchased
            | PurchaseError::DuplicateInFlight => 409,
            PurchaseError::TooManyAttempts => 429,
            PurchaseError::InvalidRequest(_) => 400,
            PurchaseError::NotFound(_) => 404,
            PurchaseError::Unauthorized => 401,
            PurchaseError::Forbidden => 403,
            PurchaseError::Database(_)
            | PurchaseError::CoordStore(_)
            | PurchaseError::Queue(_) => 503,
            PurchaseError::InvariantViolation(_) | PurchaseError::Internal(_) => 500,
        }
    }

    /// Transient failures are retried per the backoff schedule; business
    /// failures terminal-fail the job on first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PurchaseError::Database(_) | PurchaseError::CoordStore(_) | PurchaseError::Queue(_)
        )
    }
}

impl From<sqlx::Error> for PurchaseError {
    fn from(e: sqlx::Error) -> Self {
        PurchaseError::Database(e.to_string())
    }
}

impl From<redis::RedisError> for PurchaseError {
    fn from(e: redis::RedisError) -> Self {
        PurchaseError::CoordStore(e.to_string())
    }
}

impl From<serde_json::Error> for PurchaseError {
    fn from(e: serde_json::Error) -> Self {
        PurchaseError::Internal(format!("serialization: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PurchaseError::OutOfStock.code(), "OUT_OF_STOCK");
        assert_eq!(PurchaseError::AlreadyPurchased.code(), "ALREADY_PURCHASED");
        assert_eq!(PurchaseError::DuplicateInFlight.code(), "DUPLICATE_IN_FLIGHT");
        assert_eq!(PurchaseError::Database("x".into()).code(), "TRANSIENT");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(PurchaseError::SaleNotActive.http_status(), 409);
        assert_eq!(PurchaseError::TooManyAttempts.http_status(), 429);
        assert_eq!(PurchaseError::Unauthorized.http_status(), 401);
        assert_eq!(PurchaseError::Forbidden.http_status(), 403);
        assert_eq!(PurchaseError::Queue("down".into()).http_status(), 503);
    }

    #[test]
    fn test_transient_classification() {
        assert!(PurchaseError::Database("conn reset".into()).is_transient());
        assert!(PurchaseError::Queue("timeout".into()).is_transient());
        assert!(!PurchaseError::OutOfStock.is_transient());
        assert!(!PurchaseError::AlreadyPurchased.is_transient());
    }
}
