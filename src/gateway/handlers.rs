//! Gateway HTTP handlers
//!
//! Thin adapters over the in-scope services; no business logic lives
//! here. Every response uses the `{success, data?, error?, message?}`
//! envelope.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::state::AppState;
use super::types::{
    ApiError, ApiResponse, ApiResult, HealthData, LoginRequest, LoginResponse, PurchaseAccepted,
    QueueStatsData, SaleStatusQuery, SystemHealth, UserApi, accepted, ok,
};
use crate::auth::AuthedUser;
use crate::catalog::repository::UserRepository;
use crate::core_types::{JobId, SaleId};
use crate::queue::JobRecord;
use crate::sale::SaleSnapshot;
use crate::stats::SaleStats;
use crate::status::UserPurchaseState;

// ============================================================================
// Public: sale status
// ============================================================================

/// Current (or requested) sale snapshot; `data` is null when no sale
/// matches.
#[utoipa::path(
    get,
    path = "/flash-sale/status",
    params(SaleStatusQuery),
    responses((status = 200, body = ApiResponse<SaleSnapshot>)),
    tag = "sale"
)]
pub async fn get_flash_sale_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SaleStatusQuery>,
) -> ApiResult<Option<SaleSnapshot>> {
    let snapshot = state.sales.get_status(query.sale_id).await?;
    ok(snapshot)
}

// ============================================================================
// Authenticated: purchase pipeline
// ============================================================================

/// Admit a purchase intent. 202 means "queued", not "purchased"; poll
/// `/purchase/status` for the outcome.
#[utoipa::path(
    post,
    path = "/purchase",
    responses(
        (status = 202, body = ApiResponse<PurchaseAccepted>),
        (status = 409, description = "Duplicate or already purchased"),
        (status = 429, description = "Rate limit exceeded"),
    ),
    security(("bearer" = [])),
    tag = "purchase"
)]
pub async fn post_purchase(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
) -> ApiResult<PurchaseAccepted> {
    let ticket = state.admission.admit(user.user_id, None).await?;
    accepted(ticket.into())
}

/// The caller's most recent purchase state; `data` is null when nothing
/// is in flight.
#[utoipa::path(
    get,
    path = "/purchase/status",
    responses((status = 200, body = ApiResponse<UserPurchaseState>)),
    security(("bearer" = [])),
    tag = "purchase"
)]
pub async fn get_purchase_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
) -> ApiResult<Option<UserPurchaseState>> {
    let status = state.status.user_status(user.user_id).await?;
    ok(status)
}

#[utoipa::path(
    get,
    path = "/purchase/job/{job_id}",
    params(("job_id" = JobId, Path, description = "Job id from the 202 response")),
    responses(
        (status = 200, body = ApiResponse<JobRecord>),
        (status = 404, description = "Unknown or expired job"),
    ),
    security(("bearer" = [])),
    tag = "purchase"
)]
pub async fn get_job_status(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthedUser>,
    Path(job_id): Path<JobId>,
) -> ApiResult<JobRecord> {
    match state.status.job_status(job_id).await? {
        Some(record) => ok(record),
        None => Err(ApiError::not_found(format!("job {} not found", job_id))),
    }
}

// ============================================================================
// Admin: telemetry
// ============================================================================

#[utoipa::path(
    get,
    path = "/queue/stats",
    responses((status = 200, body = ApiResponse<QueueStatsData>)),
    security(("bearer" = [])),
    tag = "queue"
)]
pub async fn get_queue_stats(State(state): State<Arc<AppState>>) -> ApiResult<QueueStatsData> {
    let stats = state.queue.stats().await?;
    ok(stats.into())
}

#[utoipa::path(
    get,
    path = "/admin/flash-sale/{sale_id}/stats",
    params(("sale_id" = SaleId, Path, description = "Sale to aggregate")),
    responses(
        (status = 200, body = ApiResponse<SaleStats>),
        (status = 404, description = "Unknown sale"),
    ),
    security(("bearer" = [])),
    tag = "stats"
)]
pub async fn get_sale_stats(
    State(state): State<Arc<AppState>>,
    Path(sale_id): Path<SaleId>,
) -> ApiResult<SaleStats> {
    match state.stats.sale_stats(sale_id).await? {
        Some(stats) => ok(stats),
        None => Err(ApiError::not_found(format!("sale {} not found", sale_id))),
    }
}

// ============================================================================
// Health
// ============================================================================

async fn system_health(state: &AppState) -> (bool, SystemHealth) {
    let database = state.db.health_check().await.is_ok();
    let coordination_store = state.coord.ping().await.is_ok();
    let queue = state.queue.ping().await.is_ok();

    let up = |b: bool| if b { "up" } else { "down" }.to_string();
    (
        database && coordination_store && queue,
        SystemHealth {
            database: up(database),
            coordination_store: up(coordination_store),
            queue: up(queue),
        },
    )
}

/// Queue-centric health probe; 503 when any backing system is down.
#[utoipa::path(
    get,
    path = "/queue/health",
    responses(
        (status = 200, body = ApiResponse<HealthData>),
        (status = 503, description = "Degraded"),
    ),
    tag = "queue"
)]
pub async fn get_queue_health(State(state): State<Arc<AppState>>) -> ApiResult<HealthData> {
    let (healthy, system) = system_health(&state).await;
    let data = HealthData {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        system,
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((code, Json(ApiResponse::success(data))))
}

/// Process liveness.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, body = ApiResponse<HealthData>)),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthData> {
    get_queue_health(State(state)).await
}

// ============================================================================
// Auth (interface layer)
// ============================================================================

/// Passwordless login: auto-registers the email on first sight and
/// returns a bearer token.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses((status = 200, body = ApiResponse<LoginResponse>)),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let email = body.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }

    let user = UserRepository::ensure_by_email(state.db.pool(), email).await?;
    let token = state.auth.issue(&user)?;

    ok(LoginResponse {
        token,
        user: UserApi::from(&user),
    })
}

// ============================================================================
// Mock seed surface (dev/test builds only)
// ============================================================================

#[cfg(feature = "mock-api")]
pub async fn mock_seed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<super::types::SeedRequest>,
) -> ApiResult<super::types::SeedResponse> {
    use crate::catalog::models::Role;
    use crate::catalog::repository::{ProductRepository, SaleRepository};

    if body.total_quantity < 1 {
        return Err(ApiError::bad_request("totalQuantity must be at least 1"));
    }

    let name = body.name.as_deref().unwrap_or("Flash Deal");
    let price = body.price.unwrap_or_else(|| rust_decimal::Decimal::new(9999, 2));
    let product = ProductRepository::create(state.db.pool(), name, "", price, None).await?;
    state.stock.create(product.product_id, body.total_quantity).await?;

    let now = chrono::Utc::now();
    let start = now + chrono::Duration::seconds(body.starts_in_secs.unwrap_or(0));
    let end = start + chrono::Duration::seconds(body.duration_secs.unwrap_or(3600).max(1));
    let sale = SaleRepository::create(state.db.pool(), product.product_id, start, end).await?;

    let admin_token = match body.admin_email.as_deref() {
        Some(email) => {
            let admin = UserRepository::ensure_by_email(state.db.pool(), email).await?;
            UserRepository::set_role(state.db.pool(), admin.user_id, Role::Admin).await?;
            let admin = crate::catalog::models::User {
                role: Role::Admin,
                ..admin
            };
            Some(state.auth.issue(&admin)?)
        }
        None => None,
    };

    tracing::info!(
        product_id = %product.product_id,
        sale_id = %sale.sale_id,
        total = body.total_quantity,
        "Seeded mock flash sale"
    );

    ok(super::types::SeedResponse {
        product_id: product.product_id,
        sale_id: sale.sale_id,
        total_quantity: body.total_quantity,
        admin_token,
    })
}
