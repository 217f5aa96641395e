//! Device registration.

use axum::{extract::State, Json};

use crate::error::Result;
use crate::models::{DeviceRegisterRequest, DeviceRegisterResponse};
use crate::AppState;

/// POST /api/device/register
///
/// Mints a token for a fresh install. The owner's snapshot row is created
/// lazily on the first push, so registration alone stores no library data.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<Option<DeviceRegisterRequest>>,
) -> Result<Json<DeviceRegisterResponse>> {
    let name = payload.and_then(|p| p.name);
    let device = state.db.create_device(name.as_deref()).await?;

    tracing::info!("registered device {}", device.id);

    Ok(Json(DeviceRegisterResponse {
        device_id: device.id,
        token: device.token,
    }))
}
