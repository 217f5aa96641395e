//! Bearer-token device authentication.
//!
//! Every sync route sits behind this middleware. The token was minted at
//! registration and resolves to exactly one device; resolving it also
//! bumps the device's `last_seen_at`.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::AppState;

/// Resolved identity, attached to the request extensions.
#[derive(Clone, Debug)]
pub struct AuthenticatedDevice {
    pub device_id: Uuid,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    // Registration and the health check stay open.
    let path = request.uri().path();
    if path == "/api/device/register" || path == "/health" {
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("malformed Authorization header".to_string()))?;

    let device = state
        .db
        .get_device_by_token(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("unknown device token".to_string()))?;

    state.db.update_last_seen(device.id).await?;

    request
        .extensions_mut()
        .insert(AuthenticatedDevice {
            device_id: device.id,
        });

    Ok(next.run(request).await)
}
