//! Tenant identity extractor.
//!
//! Every tenant-facing endpoint requires an `X-Tenant-ID` header carrying
//! the tenant UUID. Webhook endpoints do not use this extractor: provider
//! pushes carry no tenant identity and resolve their tenant through the
//! call record instead.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::ApiState;

/// Error response body for auth rejections.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub error: String,
}

/// Verified tenant identity from the `X-Tenant-ID` header.
pub struct TenantAuth {
    pub tenant_id: Uuid,
}

#[async_trait]
impl FromRequestParts<ApiState> for TenantAuth {
    type Rejection = (StatusCode, Json<AuthErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(AuthErrorResponse {
                    error: "Missing X-Tenant-ID header".to_string(),
                }),
            ))?;

        let tenant_id = raw.parse::<Uuid>().map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(AuthErrorResponse {
                    error: "X-Tenant-ID is not a valid UUID".to_string(),
                }),
            )
        })?;

        Ok(TenantAuth { tenant_id })
    }
}
