//! REST API module using Axum
//!
//! Provides HTTP endpoints for the call engine:
//! - tenant API for initiating, listing, and syncing calls and campaigns
//! - provider webhook ingestion endpoint
//! - liveness endpoint

pub mod auth;
pub mod envelope;
pub mod handlers;
mod routes;

use axum::http::{header, Method};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::campaign::CampaignLauncher;
use crate::lifecycle::LifecycleManager;
use crate::store::Store;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: Arc<LifecycleManager>,
    pub launcher: Arc<CampaignLauncher>,
    pub store: Arc<dyn Store>,
    pub sync_concurrency: usize,
}

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `OUTDIAL_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for development.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("OUTDIAL_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST, Method::PATCH])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        }
        Err(_) => CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PATCH])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::root_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
