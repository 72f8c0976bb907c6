//! API handlers — consistent envelope, typed responses.
//!
//! All handlers return `Response` via [`ApiResponse::ok`] or
//! [`ApiErrorResponse`], except the webhook acknowledgment which keeps the
//! bare `{ "status": ... }` shape the provider expects.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use super::auth::TenantAuth;
use super::envelope::{ApiErrorResponse, ApiResponse};
use super::ApiState;
use crate::lifecycle::{InitiateCallParams, LifecycleError, WebhookEnvelope};
use crate::provider::GatewayError;
use crate::store::{CallFilter, StoreError};
use crate::types::{CallOutcome, CallStatus};

// ============================================================================
// Error mapping
// ============================================================================

fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::NotFound { entity } => ApiErrorResponse::not_found(format!("{entity} not found")),
        e => {
            error!(error = %e, "Store failure");
            ApiErrorResponse::internal(e.to_string())
        }
    }
}

fn lifecycle_error(e: LifecycleError) -> Response {
    match e {
        LifecycleError::Validation(msg) => ApiErrorResponse::bad_request(msg),
        e @ LifecycleError::CallNotFound(_) => ApiErrorResponse::not_found(e.to_string()),
        e @ LifecycleError::MissingExternalId(_) => ApiErrorResponse::bad_request(e.to_string()),
        LifecycleError::Gateway(GatewayError::Configuration) => {
            ApiErrorResponse::service_unavailable(GatewayError::Configuration.to_string())
        }
        LifecycleError::Gateway(e) => ApiErrorResponse::bad_gateway(e.to_string()),
        LifecycleError::Store(e) => store_error(e),
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Response {
    ApiResponse::ok(HealthStatus {
        status: "ok",
        service: "outdial",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Webhooks
// ============================================================================

/// Ingest one provider webhook event.
///
/// Always acknowledges with 200 and the bare ack shape; the provider treats
/// any non-2xx as a delivery failure and retries, which cannot help for
/// orphan or malformed events.
pub async fn provider_webhook(
    State(state): State<ApiState>,
    Json(envelope): Json<WebhookEnvelope>,
) -> Response {
    match state.lifecycle.apply_event(&envelope).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => {
            error!(error = %e, event = %envelope.event, "Webhook processing failed");
            ApiErrorResponse::internal(e.to_string())
        }
    }
}

// ============================================================================
// Calls
// ============================================================================

pub async fn initiate_call(
    State(state): State<ApiState>,
    auth: TenantAuth,
    Json(params): Json<InitiateCallParams>,
) -> Response {
    match state.lifecycle.initiate(auth.tenant_id, params).await {
        Ok(call) => ApiResponse::created(call),
        Err(e) => lifecycle_error(e),
    }
}

pub async fn get_call(
    State(state): State<ApiState>,
    auth: TenantAuth,
    Path(call_id): Path<Uuid>,
) -> Response {
    match state.store.get_call(call_id).await {
        Ok(call) if call.tenant_id == auth.tenant_id => ApiResponse::ok(call),
        Ok(_) => ApiErrorResponse::not_found("call not found"),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCallStatusBody {
    pub status: CallStatus,
}

/// Manual status override for a call, e.g. marking a stuck call failed.
/// Terminal calls refuse the transition with a 400.
pub async fn update_call_status(
    State(state): State<ApiState>,
    auth: TenantAuth,
    Path(call_id): Path<Uuid>,
    Json(body): Json<UpdateCallStatusBody>,
) -> Response {
    let call = match state.store.get_call(call_id).await {
        Ok(call) => call,
        Err(e) => return store_error(e),
    };
    if call.tenant_id != auth.tenant_id {
        return ApiErrorResponse::not_found("call not found");
    }

    match state.lifecycle.set_status(call_id, body.status).await {
        Ok(call) => ApiResponse::ok(call),
        Err(e) => lifecycle_error(e),
    }
}

pub async fn sync_call(
    State(state): State<ApiState>,
    auth: TenantAuth,
    Path(call_id): Path<Uuid>,
) -> Response {
    // Tenant scoping happens here: the store lookup is unscoped because
    // webhook paths share it.
    let call = match state.store.get_call(call_id).await {
        Ok(call) => call,
        Err(e) => return store_error(e),
    };
    if call.tenant_id != auth.tenant_id {
        return ApiErrorResponse::not_found("call not found");
    }

    match state.lifecycle.reconcile(call_id).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => lifecycle_error(e),
    }
}

pub async fn sync_pending_calls(State(state): State<ApiState>, auth: TenantAuth) -> Response {
    match state
        .lifecycle
        .sync_pending(auth.tenant_id, state.sync_concurrency)
        .await
    {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => lifecycle_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListCallsQuery {
    pub status: Option<CallStatus>,
    pub outcome: Option<CallOutcome>,
    pub campaign_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
}

pub async fn list_calls(
    State(state): State<ApiState>,
    auth: TenantAuth,
    Query(query): Query<ListCallsQuery>,
) -> Response {
    let filter = CallFilter {
        status: query.status,
        outcome: query.outcome,
        campaign_id: query.campaign_id,
        lead_id: query.lead_id,
    };
    match state.store.list_calls(auth.tenant_id, &filter).await {
        Ok(calls) => ApiResponse::ok(calls),
        Err(e) => store_error(e),
    }
}

/// Calls currently in progress.
pub async fn active_calls(State(state): State<ApiState>, auth: TenantAuth) -> Response {
    let filter = CallFilter {
        status: Some(CallStatus::InProgress),
        ..CallFilter::default()
    };
    match state.store.list_calls(auth.tenant_id, &filter).await {
        Ok(calls) => ApiResponse::ok(calls),
        Err(e) => store_error(e),
    }
}

/// Calls queued but not yet dialed.
pub async fn queued_calls(State(state): State<ApiState>, auth: TenantAuth) -> Response {
    let filter = CallFilter {
        status: Some(CallStatus::Pending),
        ..CallFilter::default()
    };
    match state.store.list_calls(auth.tenant_id, &filter).await {
        Ok(calls) => ApiResponse::ok(calls),
        Err(e) => store_error(e),
    }
}

// ============================================================================
// Campaigns
// ============================================================================

pub async fn launch_campaign(
    State(state): State<ApiState>,
    auth: TenantAuth,
    Path(campaign_id): Path<Uuid>,
) -> Response {
    match state.launcher.launch(campaign_id, auth.tenant_id).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => store_error(e),
    }
}

pub async fn campaign_stats(
    State(state): State<ApiState>,
    auth: TenantAuth,
    Path(campaign_id): Path<Uuid>,
) -> Response {
    match state
        .store
        .campaign_stats(campaign_id, auth.tenant_id)
        .await
    {
        Ok(stats) => ApiResponse::ok(stats),
        Err(e) => store_error(e),
    }
}
