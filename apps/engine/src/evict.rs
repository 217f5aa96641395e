//! Eviction of stale content payloads.
//!
//! Heavy content records are the only thing worth evicting; metadata and
//! vocabulary stay resident forever. A record may be demoted only after a
//! backup verifiably holds its payload, so candidate selection is gated
//! on enumerating backup keys first. Restoration checks the mirror before
//! going to the network.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lexiread_core::types::{now_millis, ContentRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::mirror::DirectoryMirror;
use crate::remote::{RemoteClient, RemoteError};
use crate::state::{CoreHandle, EngineError};

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("record {0} not found in any backup")]
    NotFound(String),

    #[error("restore already in flight for {0}")]
    InFlight(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Pick eviction candidates: records unopened for longer than
/// `staleness` whose payload a backup verifiably holds, oldest first.
/// An empty backup set selects nothing.
pub fn select_candidates(
    records: &std::collections::BTreeMap<String, ContentRecord>,
    backup_keys: &BTreeSet<String>,
    now: i64,
    staleness: Duration,
) -> Vec<String> {
    if backup_keys.is_empty() {
        return Vec::new();
    }
    let cutoff = now - staleness.as_millis() as i64;
    let mut stale: Vec<(&String, i64)> = records
        .iter()
        .filter(|(key, record)| record.last_opened_at <= cutoff && backup_keys.contains(*key))
        .map(|(key, record)| (key, record.last_opened_at))
        .collect();
    stale.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    stale.into_iter().map(|(key, _)| key.clone()).collect()
}

pub struct EvictionManager {
    core: CoreHandle,
    remote: Arc<RemoteClient>,
    mirror: Option<Arc<DirectoryMirror>>,
    staleness: Duration,
    restores_in_flight: Mutex<BTreeSet<String>>,
}

impl EvictionManager {
    pub fn new(
        core: CoreHandle,
        remote: Arc<RemoteClient>,
        mirror: Option<Arc<DirectoryMirror>>,
        staleness: Duration,
    ) -> Self {
        Self {
            core,
            remote,
            mirror,
            staleness,
            restores_in_flight: Mutex::new(BTreeSet::new()),
        }
    }

    /// Enumerate keys every reachable backup holds. Union of mirror and
    /// remote: either one holding a payload is enough to evict it.
    async fn backup_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        if let Some(mirror) = &self.mirror {
            match mirror.record_keys() {
                Ok(mirrored) => keys.extend(mirrored),
                Err(err) => warn!(%err, "mirror key enumeration failed"),
            }
        }
        if self.remote.is_authenticated() {
            match self.remote.record_keys().await {
                Ok(remote) => keys.extend(remote),
                Err(err) => warn!(%err, "remote key enumeration failed"),
            }
        }
        keys
    }

    /// Demote every stale, backed-up record. Returns how many were
    /// evicted. Safe to run at any time; with no reachable backup it
    /// evicts nothing.
    pub async fn sweep(&self) -> Result<usize, EngineError> {
        let state = self.core.state().await?;
        if state.snapshot.records.is_empty() {
            return Ok(0);
        }
        let backup_keys = self.backup_keys().await;
        let candidates = select_candidates(
            &state.snapshot.records,
            &backup_keys,
            now_millis(),
            self.staleness,
        );
        if candidates.is_empty() {
            debug!("eviction sweep found no candidates");
            return Ok(0);
        }
        let count = candidates.len();
        info!(count, "evicting stale records");
        self.core
            .apply(Command::MarkEvicted { keys: candidates })
            .await?;
        Ok(count)
    }

    /// Bring an evicted payload back: mirror first, remote second. The
    /// restored record is resident again on return.
    pub async fn restore(&self, key: &str) -> Result<ContentRecord, RestoreError> {
        {
            let mut in_flight = self.restores_in_flight.lock().expect("restore lock");
            if !in_flight.insert(key.to_string()) {
                return Err(RestoreError::InFlight(key.to_string()));
            }
        }
        let result = self.restore_inner(key).await;
        self.restores_in_flight
            .lock()
            .expect("restore lock")
            .remove(key);
        result
    }

    async fn restore_inner(&self, key: &str) -> Result<ContentRecord, RestoreError> {
        if let Some(mirror) = &self.mirror {
            match mirror.read_one(key) {
                Ok(Some(record)) => {
                    debug!(key, "restored record from mirror");
                    self.commit(key, record.clone()).await?;
                    return Ok(record);
                }
                Ok(None) => {}
                Err(err) => warn!(key, %err, "mirror restore read failed"),
            }
        }
        if self.remote.is_authenticated() {
            if let Some(record) = self.remote.fetch_record(key).await? {
                debug!(key, "restored record from remote");
                self.commit(key, record.clone()).await?;
                return Ok(record);
            }
        }
        Err(RestoreError::NotFound(key.to_string()))
    }

    async fn commit(&self, key: &str, record: ContentRecord) -> Result<(), EngineError> {
        self.core
            .apply(Command::RestoreRecord {
                key: key.to_string(),
                record,
            })
            .await?;
        Ok(())
    }
}
