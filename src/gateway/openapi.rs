//! OpenAPI documentation for the gateway

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_flash_sale_status,
        handlers::post_purchase,
        handlers::get_purchase_status,
        handlers::get_job_status,
        handlers::get_queue_stats,
        handlers::get_queue_health,
        handlers::get_sale_stats,
        handlers::health_check,
        handlers::login,
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "sale", description = "Sale status reads"),
        (name = "purchase", description = "Purchase admission and polling"),
        (name = "queue", description = "Queue telemetry and health"),
        (name = "stats", description = "Admin aggregates"),
        (name = "auth", description = "Token issuance"),
        (name = "health", description = "Liveness"),
    ),
    info(
        title = "blitzsale API",
        description = "Flash-sale purchase processor: admission, queueing, status polling.",
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
