//! The embeddable persistence and sync engine.
//!
//! A UI links against this crate and gets: a namespaced persistent store
//! (SQLite), a plain-file directory mirror, a client for the remote
//! backup store, stale-content eviction, and a sync orchestrator, all
//! behind one serialized command path so state changes apply in order
//! no matter where they originate.

pub mod command;
pub mod config;
pub mod evict;
pub mod mirror;
pub mod remote;
pub mod state;
pub mod store;
pub mod sync;

use std::sync::Arc;

use tracing::info;

pub use command::{Command, CoreState};
pub use config::EngineConfig;
pub use evict::{EvictionManager, RestoreError};
pub use mirror::DirectoryMirror;
pub use remote::{RemoteClient, RemoteError};
pub use state::{CoreHandle, Engine, EngineError};
pub use store::{KeyValueStore, SqliteStore, StoreError};
pub use sync::{SyncOrchestrator, SyncStatus};

/// All engine components wired together.
///
/// [`Lexiread::start`] must run inside a tokio runtime; it spawns the
/// sync scheduler loop. Call [`SyncOrchestrator::startup_sync`] once the
/// caller is ready to reconcile against the backup.
pub struct Lexiread {
    pub core: CoreHandle,
    pub remote: Arc<RemoteClient>,
    pub evictions: Arc<EvictionManager>,
    pub sync: Arc<SyncOrchestrator>,
}

impl Lexiread {
    pub fn start(config: &EngineConfig) -> anyhow::Result<Self> {
        if let Some(parent) = config.store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = SqliteStore::open(&config.store_path, config.quota_bytes)?;
        let mirror = match &config.mirror_dir {
            Some(dir) => Some(Arc::new(DirectoryMirror::new(dir)?)),
            None => None,
        };

        let core = Engine::start(store, mirror.clone())?;
        let remote = Arc::new(RemoteClient::new(
            &config.remote_base_url,
            config.remote_token.clone(),
        ));
        let evictions = Arc::new(EvictionManager::new(
            core.clone(),
            remote.clone(),
            mirror,
            config.staleness,
        ));
        let sync = Arc::new(SyncOrchestrator::new(
            core.clone(),
            remote.clone(),
            evictions.clone(),
            config.debounce,
        ));
        tokio::spawn(sync.clone().run());

        info!(store = %config.store_path.display(), "engine started");
        Ok(Lexiread {
            core,
            remote,
            evictions,
            sync,
        })
    }
}
