//! Diagnostics HTTP layer: health and pipeline statistics.
//!
//! Only served when `DIAGNOSTICS_ADDR` is configured. With the `swagger-ui`
//! feature the OpenAPI document is browsable at `/swagger-ui`.

pub mod handlers;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the diagnostics endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "wake-feed diagnostics"),
    paths(handlers::system::health_handler, handlers::system::stats_handler),
    tags((name = "System", description = "Service health and feed statistics"))
)]
pub struct ApiDoc;

/// Builds the router with every diagnostics endpoint.
pub fn build_router() -> Router<AppState> {
    with_swagger(Router::new().merge(handlers::system::routes()))
}

#[cfg(feature = "swagger-ui")]
fn with_swagger(router: Router<AppState>) -> Router<AppState> {
    router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn with_swagger(router: Router<AppState>) -> Router<AppState> {
    router
}

/// Complete diagnostics application: routes, request tracing, CORS, state.
pub fn diagnostics_app(state: AppState) -> Router {
    build_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
