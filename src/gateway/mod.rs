pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::middleware::{require_admin, require_auth};
use state::AppState;

/// Build the gateway router.
pub fn build_router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Public routes (no auth required)
    // ==========================================================================
    let public_routes = Router::new()
        .route("/flash-sale/status", get(handlers::get_flash_sale_status))
        .route("/queue/health", get(handlers::get_queue_health))
        .route("/health", get(handlers::health_check))
        .route("/auth/login", post(handlers::login));

    // ==========================================================================
    // Authenticated routes (bearer token)
    // ==========================================================================
    let user_routes = Router::new()
        .route("/purchase", post(handlers::post_purchase))
        .route("/purchase/status", get(handlers::get_purchase_status))
        .route("/purchase/job/{job_id}", get(handlers::get_job_status))
        .layer(from_fn_with_state(state.clone(), require_auth));

    // ==========================================================================
    // Admin routes (bearer token + admin role)
    // ==========================================================================
    let admin_routes = Router::new()
        .route("/queue/stats", get(handlers::get_queue_stats))
        .route(
            "/admin/flash-sale/{sale_id}/stats",
            get(handlers::get_sale_stats),
        )
        .layer(axum::middleware::from_fn(require_admin))
        .layer(from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes);

    // [SECURITY] Mock seed routes - only compiled when 'mock-api' is enabled.
    // Production builds MUST be compiled with `--no-default-features`.
    #[cfg(feature = "mock-api")]
    let app = app.nest(
        "/internal/mock",
        Router::new().route("/seed", post(handlers::mock_seed)),
    );

    app.with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Start the HTTP gateway and serve until shutdown is signalled.
pub async fn run_server(
    state: Arc<AppState>,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("API docs at http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received, stopping gateway");
                }
                _ = shutdown.wait_for(|stop| *stop) => {
                    tracing::info!("Shutdown signalled, stopping gateway");
                }
            }
        })
        .await?;

    Ok(())
}
