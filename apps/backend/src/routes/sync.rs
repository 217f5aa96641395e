//! Sync endpoints

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::error::{ApiError, Result};
use crate::models::{ContentRecord, RecordKeysResponse, SyncPushRequest, SyncPushResponse, SyncRecord};
use crate::routes::auth::AuthenticatedDevice;
use crate::AppState;

/// POST /api/sync/pull
/// Return the device's stored record, or null if none exists yet
pub async fn pull(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDevice>,
) -> Result<Json<Option<SyncRecord>>> {
    let record = state.db.get_snapshot(auth.device_id).await?;
    Ok(Json(record))
}

/// POST /api/sync/push
/// Idempotent upsert of the device's record
pub async fn push(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDevice>,
    Json(payload): Json<SyncPushRequest>,
) -> Result<Json<SyncPushResponse>> {
    let updated_at = state
        .db
        .upsert_snapshot(
            auth.device_id,
            payload.snapshot,
            &payload.removed_record_keys,
            payload.updated_at,
        )
        .await?;

    tracing::debug!("Accepted push from device {}", auth.device_id);

    Ok(Json(SyncPushResponse { updated_at }))
}

/// GET /api/sync/records
/// Keys of every content record the store holds for this device
pub async fn record_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDevice>,
) -> Result<Json<RecordKeysResponse>> {
    let keys = state.db.record_keys(auth.device_id).await?;
    Ok(Json(RecordKeysResponse { keys }))
}

/// GET /api/sync/records/{key}
/// One content record by key (keys contain slashes)
pub async fn record(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDevice>,
    Path(key): Path<String>,
) -> Result<Json<ContentRecord>> {
    let record = state
        .db
        .get_record(auth.device_id, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("record {key}")))?;
    Ok(Json(record))
}
