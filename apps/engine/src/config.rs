//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Everything the engine needs to run, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Location of the local store database.
    pub store_path: PathBuf,
    /// Root of the plain-file mirror, `None` to disable mirroring.
    pub mirror_dir: Option<PathBuf>,
    /// Soft budget for the local store, `None` for unbounded.
    pub quota_bytes: Option<u64>,
    /// Base URL of the sync backend.
    pub remote_base_url: String,
    /// Device token, if this install has registered.
    pub remote_token: Option<String>,
    /// Quiet window after the last data change before a push fires.
    pub debounce: Duration,
    /// Records unopened for this long become eviction candidates.
    pub staleness: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lexiread");
        Self {
            store_path: data_dir.join("lexiread.db"),
            mirror_dir: Some(data_dir.join("library")),
            quota_bytes: None,
            remote_base_url: "http://localhost:3000".to_string(),
            remote_token: None,
            debounce: Duration::from_secs(8),
            staleness: Duration::from_secs(60 * 60 * 24 * 30),
        }
    }
}

impl EngineConfig {
    /// Apply `LEXIREAD_*` environment overrides on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("LEXIREAD_SYNC_URL") {
            config.remote_base_url = url;
        }
        if let Ok(token) = std::env::var("LEXIREAD_SYNC_TOKEN") {
            config.remote_token = Some(token);
        }
        if let Ok(path) = std::env::var("LEXIREAD_DATA_DIR") {
            let dir = PathBuf::from(path);
            config.store_path = dir.join("lexiread.db");
            config.mirror_dir = Some(dir.join("library"));
        }
        if let Some(bytes) = env_u64("LEXIREAD_QUOTA_BYTES") {
            config.quota_bytes = Some(bytes);
        }
        if let Some(secs) = env_u64("LEXIREAD_DEBOUNCE_SECS") {
            config.debounce = Duration::from_secs(secs);
        }
        if let Some(days) = env_u64("LEXIREAD_STALENESS_DAYS") {
            config.staleness = Duration::from_secs(days * 60 * 60 * 24);
        }
        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
