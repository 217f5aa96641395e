//! Database models and API types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// The wire snapshot is the shared core type.
pub use lexiread_core::types::{ContentRecord, Snapshot};

// === Database Entity Types ===

/// Device registration info
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    pub id: Uuid,
    pub token: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

// === API Request/Response Types ===

#[derive(Debug, Deserialize)]
pub struct DeviceRegisterRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceRegisterResponse {
    pub device_id: Uuid,
    pub token: String,
}

/// The owner's stored record, returned by pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub snapshot: Snapshot,
    /// Epoch milliseconds of the last accepted push.
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct SyncPushRequest {
    pub snapshot: Snapshot,
    /// Record keys the client deleted since its last delivered push.
    /// Only this list removes records; keys merely absent from the
    /// snapshot (evicted client-side) keep their stored copy.
    #[serde(default)]
    pub removed_record_keys: Vec<String>,
    pub updated_at: i64,
}

#[derive(Debug, Serialize)]
pub struct SyncPushResponse {
    pub updated_at: i64,
}

#[derive(Debug, Serialize)]
pub struct RecordKeysResponse {
    pub keys: Vec<String>,
}
