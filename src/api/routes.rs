//! API route definitions
//!
//! Organizes endpoints for tenant clients and the provider:
//! - /api/v1/calls/* - call initiation, listing, and sync
//! - /api/v1/campaigns/* - campaign launch and stats
//! - /webhooks/provider - provider event push (no tenant header)
//! - /health - liveness

use axum::routing::{get, patch, post};
use axum::Router;

use super::{handlers, ApiState};

/// Tenant-facing API routes, nested under `/api/v1`.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/calls/initiate", post(handlers::initiate_call))
        .route("/calls/sync", post(handlers::sync_pending_calls))
        .route("/calls/:id/sync", post(handlers::sync_call))
        .route("/calls/:id", get(handlers::get_call))
        .route("/calls/:id/status", patch(handlers::update_call_status))
        .route("/calls", get(handlers::list_calls))
        .route("/calls/active", get(handlers::active_calls))
        .route("/calls/queue", get(handlers::queued_calls))
        .route("/campaigns/:id/launch", post(handlers::launch_campaign))
        .route("/campaigns/:id/stats", get(handlers::campaign_stats))
        .with_state(state)
}

/// Provider webhook and liveness routes at the root.
pub fn root_routes(state: ApiState) -> Router {
    Router::new()
        .route("/webhooks/provider", post(handlers::provider_webhook))
        .route("/health", get(handlers::health))
        .with_state(state)
}
