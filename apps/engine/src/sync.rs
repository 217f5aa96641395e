//! Sync orchestration: startup reconciliation, the debounced push loop,
//! and the periodic eviction sweep.
//!
//! The orchestrator never mutates state directly; every outcome goes
//! back through the command path, so a sync landing mid-session can
//! never interleave with a user edit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lexiread_core::types::{now_millis, PendingMerge};
use lexiread_core::{conflict, merge};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::{Command, CoreState};
use crate::evict::EvictionManager;
use crate::remote::{RemoteClient, RemoteError};
use crate::state::{CoreHandle, EngineError};

const TICK: Duration = Duration::from_secs(1);
/// Eviction sweeps run on this many scheduler ticks, roughly hourly.
const SWEEP_EVERY_TICKS: u64 = 3600;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Where sync currently stands, for UI consumption.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Idle,
    StartupSync,
    Pushing,
    Completed { summary: Option<String> },
    Failed { message: String },
    Paused,
}

pub struct SyncOrchestrator {
    core: CoreHandle,
    remote: Arc<RemoteClient>,
    evictions: Arc<EvictionManager>,
    debounce: Duration,
    status: Mutex<SyncStatus>,
    startup_done: AtomicBool,
    sync_paused: AtomicBool,
    syncing: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        core: CoreHandle,
        remote: Arc<RemoteClient>,
        evictions: Arc<EvictionManager>,
        debounce: Duration,
    ) -> Self {
        Self {
            core,
            remote,
            evictions,
            debounce,
            status: Mutex::new(SyncStatus::Idle),
            startup_done: AtomicBool::new(false),
            sync_paused: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
        }
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.lock().await.clone()
    }

    async fn set_status(&self, status: SyncStatus) {
        *self.status.lock().await = status;
    }

    pub fn is_paused(&self) -> bool {
        self.sync_paused.load(Ordering::SeqCst)
    }

    pub fn startup_done(&self) -> bool {
        self.startup_done.load(Ordering::SeqCst)
    }

    /// Stop pushing before a reset or sign-out. Only a fresh
    /// [`startup_sync`](Self::startup_sync) after re-auth unpauses.
    pub async fn pause(&self) {
        self.sync_paused.store(true, Ordering::SeqCst);
        self.set_status(SyncStatus::Paused).await;
        info!("sync paused");
    }

    /// Reconcile local state against the remote backup once at startup.
    ///
    /// Network failure leaves local state untouched and surfaces a
    /// warning; the app keeps working offline. Always ends with
    /// `startup_done` set so the push loop can take over.
    pub async fn startup_sync(&self) {
        if self.syncing.swap(true, Ordering::SeqCst) {
            debug!("startup sync already running");
            return;
        }
        if !self.remote.is_authenticated() {
            // Local-only mode: nothing to reconcile against.
            debug!("skipping startup sync, no device token");
            self.startup_done.store(true, Ordering::SeqCst);
            self.syncing.store(false, Ordering::SeqCst);
            return;
        }
        self.set_status(SyncStatus::StartupSync).await;

        match self.startup_sync_inner().await {
            Ok(summary) => {
                if let Some(summary) = &summary {
                    info!(%summary, "startup sync merged remote changes");
                } else {
                    debug!("startup sync completed, no divergence");
                }
                self.set_status(SyncStatus::Completed { summary }).await;
            }
            Err(err) => {
                warn!(%err, "startup sync failed, continuing with local data");
                self.set_status(SyncStatus::Failed {
                    message: err.to_string(),
                })
                .await;
            }
        }

        self.startup_done.store(true, Ordering::SeqCst);
        self.sync_paused.store(false, Ordering::SeqCst);
        self.syncing.store(false, Ordering::SeqCst);
    }

    async fn startup_sync_inner(&self) -> Result<Option<String>, SyncError> {
        let state = self.core.state().await?;

        let Some(remote_record) = self.remote.pull().await? else {
            // First device for this owner: seed the backup.
            self.push_state(&state).await?;
            return Ok(None);
        };

        if state.snapshot.is_empty() {
            // Fresh install adopting an existing backup wholesale; no
            // merge happened, so nothing to offer a revert of.
            self.core
                .apply(Command::ReplaceAll(remote_record.snapshot))
                .await?;
            let adopted = self.core.state().await?;
            self.core
                .apply(Command::SyncCommitted {
                    at: adopted.sync.last_modified,
                    sent_tombstones: Vec::new(),
                })
                .await?;
            return Ok(None);
        }

        let report = conflict::detect(
            &state.snapshot,
            state.sync.last_modified,
            &remote_record.snapshot,
            remote_record.updated_at,
        );
        let Some(report) = report else {
            // Same data on both sides; just advance the marker.
            self.core
                .apply(Command::SyncCommitted {
                    at: state.sync.last_modified,
                    sent_tombstones: Vec::new(),
                })
                .await?;
            return Ok(None);
        };

        info!(
            local_courses = report.local_courses,
            remote_courses = report.remote_courses,
            local_words = report.local_words,
            remote_words = report.remote_words,
            remote_newer = report.remote_newer,
            "snapshots diverged, merging"
        );

        let outcome = merge::merge(&state.snapshot, &remote_record.snapshot);
        let pre_merge = PendingMerge {
            snapshot: state.snapshot.clone(),
            taken_at: now_millis(),
        };
        self.core
            .apply(Command::ApplyMergedSnapshot {
                merged: outcome.snapshot,
                pre_merge,
            })
            .await?;

        let merged_state = self.core.state().await?;
        self.push_state(&merged_state).await?;
        Ok(Some(outcome.stats.summary()))
    }

    /// Push the given state and advance `cloud_last_synced` to its
    /// `last_modified`, dropping the tombstones that were delivered.
    async fn push_state(&self, state: &CoreState) -> Result<(), SyncError> {
        self.remote
            .push(
                &state.snapshot,
                &state.removed_record_keys,
                state.sync.last_modified,
            )
            .await?;
        self.core
            .apply(Command::SyncCommitted {
                at: state.sync.last_modified,
                sent_tombstones: state.removed_record_keys.clone(),
            })
            .await?;
        Ok(())
    }

    /// Undo the last startup merge, restoring the pre-merge snapshot
    /// while keeping everything created since. The restored state pushes
    /// through the normal debounce.
    pub async fn revert_last_merge(&self) -> Result<(), EngineError> {
        info!("reverting last merge");
        self.core.apply(Command::RevertMerge).await?;
        Ok(())
    }

    /// Restore one evicted record, mirror first then remote.
    pub async fn request_restore(
        &self,
        key: &str,
    ) -> Result<lexiread_core::types::ContentRecord, crate::evict::RestoreError> {
        self.evictions.restore(key).await
    }

    async fn debounced_push(&self) {
        if self.syncing.swap(true, Ordering::SeqCst) {
            return;
        }
        let result = async {
            let state = self.core.state().await?;
            if state.sync.cloud_last_synced >= state.sync.last_modified {
                return Ok::<bool, SyncError>(false);
            }
            if !self.remote.is_authenticated() {
                return Ok(false);
            }
            self.set_status(SyncStatus::Pushing).await;
            self.push_state(&state).await?;
            Ok(true)
        }
        .await;

        match result {
            Ok(true) => {
                debug!("debounced push completed");
                self.set_status(SyncStatus::Completed { summary: None }).await;
            }
            Ok(false) => {}
            Err(err) => {
                // Reported once; the deadline is disarmed until the next
                // data change, so a dead backend is never hot-looped.
                warn!(%err, "debounced push failed");
                self.set_status(SyncStatus::Failed {
                    message: err.to_string(),
                })
                .await;
            }
        }
        self.syncing.store(false, Ordering::SeqCst);
    }

    /// The scheduler loop: arms a deadline on every data change and
    /// checks it (plus the sweep cadence) on a one-second tick.
    pub async fn run(self: Arc<Self>) {
        let mut changes = self.core.changes();
        let mut deadline: Option<Instant> = None;
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        debug!("engine gone, stopping sync loop");
                        return;
                    }
                    deadline = Some(Instant::now() + self.debounce);
                }
                _ = interval.tick() => {
                    ticks += 1;
                    if self.is_paused() || !self.startup_done() {
                        continue;
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        deadline = None;
                        self.debounced_push().await;
                    }
                    if ticks % SWEEP_EVERY_TICKS == 0 {
                        match self.evictions.sweep().await {
                            Ok(0) => {}
                            Ok(count) => info!(count, "eviction sweep demoted records"),
                            Err(err) => warn!(%err, "eviction sweep failed"),
                        }
                    }
                }
            }
        }
    }
}
