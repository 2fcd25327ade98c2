//! System endpoints: health check and feed statistics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::ws::dispatcher::DispatchStats;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns `healthy` while the dispatcher runs, `degraded` once it has stopped.",
    responses(
        (status = 200, description = "Dispatcher is running", body = HealthResponse),
        (status = 503, description = "Dispatcher has stopped", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (code, status) = if state.dispatcher.is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "healthy")
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Feed statistics response.
#[derive(Debug, Serialize, ToSchema)]
struct StatsResponse {
    dispatcher: DispatchStats,
    subscriptions: usize,
    topics: usize,
}

/// `GET /stats`: Pipeline counters and bus occupancy.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "System",
    summary = "Feed statistics",
    description = "Returns dispatcher counters and the number of live bus subscriptions.",
    responses(
        (status = 200, description = "Current statistics", body = StatsResponse),
    )
)]
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatsResponse {
            dispatcher: state.dispatcher.stats(),
            subscriptions: state.event_bus.subscription_count(),
            topics: state.event_bus.topic_count(),
        }),
    )
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
}
