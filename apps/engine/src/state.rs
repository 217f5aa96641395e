//! The engine task: single owner of [`CoreState`].
//!
//! One background thread holds the state, the store handle, and the
//! mirror handle. Everything else talks to it through [`CoreHandle`]:
//! commands are applied in arrival order, the changed slices are
//! persisted, and a watch channel announces every sync-relevant change
//! so the orchestrator can arm its debounce deadline.

use std::collections::{BTreeMap, BTreeSet};

use lexiread_core::types::{ContentRecord, Snapshot, SyncState};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::command::{apply, Changed, Command, CoreState};
use crate::mirror::DirectoryMirror;
use crate::store::{ns, KeyValueStore, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine task stopped")]
    Stopped,
}

/// What happened to a command after the reducer ran.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub changed: Changed,
    /// Set when persistence was rejected by the storage quota. The
    /// in-memory state keeps the mutation; the caller surfaces the
    /// warning and the eviction sweep makes room.
    pub quota_exceeded: bool,
}

enum Msg {
    Apply(Command, Option<oneshot::Sender<ApplyReport>>),
    View(oneshot::Sender<CoreState>),
}

/// Cloneable handle to the engine task.
#[derive(Clone)]
pub struct CoreHandle {
    tx: mpsc::UnboundedSender<Msg>,
    changes: watch::Receiver<i64>,
}

impl CoreHandle {
    /// Apply a command and wait for the persistence outcome.
    pub async fn apply(&self, command: Command) -> Result<ApplyReport, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Msg::Apply(command, Some(tx)))
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Fire-and-forget submission, for callers that cannot await.
    pub fn submit(&self, command: Command) {
        let _ = self.tx.send(Msg::Apply(command, None));
    }

    /// Clone of the current state.
    pub async fn state(&self) -> Result<CoreState, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Msg::View(tx))
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Watch channel carrying `last_modified` after every sync-relevant
    /// change.
    pub fn changes(&self) -> watch::Receiver<i64> {
        self.changes.clone()
    }
}

/// Sync bookkeeping persisted as one document: the core sync state plus
/// tombstones for record keys deleted since the last delivered push.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SyncDoc {
    sync: SyncState,
    #[serde(default)]
    removed_record_keys: Vec<String>,
}

pub struct Engine<S: KeyValueStore> {
    state: CoreState,
    store: S,
    mirror: Option<std::sync::Arc<DirectoryMirror>>,
}

impl<S: KeyValueStore + 'static> Engine<S> {
    /// Load persisted state (hydrating an empty store from the mirror
    /// when one is configured) and start the engine task.
    pub fn start(
        store: S,
        mirror: Option<std::sync::Arc<DirectoryMirror>>,
    ) -> Result<CoreHandle, StoreError> {
        let mut engine = Engine {
            state: load(&store)?,
            store,
            mirror,
        };
        engine.hydrate_from_mirror()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (changes_tx, changes_rx) = watch::channel(engine.state.sync.last_modified);

        std::thread::Builder::new()
            .name("lexiread-engine".to_string())
            .spawn(move || {
                while let Some(msg) = rx.blocking_recv() {
                    match msg {
                        Msg::Apply(command, reply) => {
                            let report = engine.handle_command(command);
                            if report.changed.sync {
                                let _ = changes_tx.send(engine.state.sync.last_modified);
                            }
                            if let Some(reply) = reply {
                                let _ = reply.send(report);
                            }
                        }
                        Msg::View(reply) => {
                            let _ = reply.send(engine.state.clone());
                        }
                    }
                }
                debug!("engine task exiting");
            })
            .expect("spawn engine thread");

        Ok(CoreHandle {
            tx,
            changes: changes_rx,
        })
    }

    fn hydrate_from_mirror(&mut self) -> Result<(), StoreError> {
        let Some(mirror) = &self.mirror else {
            return Ok(());
        };
        if !self.state.snapshot.is_empty() {
            return Ok(());
        }
        let mirrored = mirror.read_all();
        if mirrored.is_empty() {
            return Ok(());
        }
        info!(root = %mirror.root().display(), "store empty, hydrating from mirror");
        let changed = apply(&mut self.state, Command::ReplaceAll(mirrored.into_snapshot()));
        self.persist(&changed)?;
        Ok(())
    }

    fn handle_command(&mut self, command: Command) -> ApplyReport {
        let changed = apply(&mut self.state, command);
        if changed.is_empty() {
            return ApplyReport::default();
        }
        let quota_exceeded = match self.persist(&changed) {
            Ok(()) => false,
            Err(err) if err.is_quota() => {
                // Keep the in-memory mutation; the caller shows the
                // banner and triggers an eviction sweep.
                warn!(%err, "persistence rejected by quota, state kept in memory");
                true
            }
            Err(err) => {
                warn!(%err, "persistence failed");
                false
            }
        };
        self.mirror_changes(&changed);
        ApplyReport {
            changed,
            quota_exceeded,
        }
    }

    /// Write exactly the changed slices back to the store.
    fn persist(&self, changed: &Changed) -> Result<(), StoreError> {
        let snapshot = &self.state.snapshot;
        if changed.courses {
            set_doc(&self.store, ns::COURSES, &snapshot.courses)?;
        }
        if changed.progress {
            set_doc(&self.store, ns::PROGRESS, &snapshot.progress)?;
        }
        if changed.items {
            set_doc(&self.store, ns::ITEMS, &snapshot.items)?;
        }
        if changed.vocabulary {
            set_doc(&self.store, ns::VOCABULARY, &snapshot.vocabulary)?;
        }
        if changed.exported {
            set_doc(&self.store, ns::EXPORTED, &snapshot.exported_words)?;
        }
        if changed.evicted {
            set_doc(&self.store, ns::EVICTED, &self.state.evicted)?;
        }
        for key in changed
            .records_deleted
            .iter()
            .chain(changed.records_evicted.iter())
        {
            self.store.delete(ns::RECORDS, key)?;
        }
        for key in &changed.records_written {
            if let Some(record) = snapshot.records.get(key) {
                let json = serde_json::to_string(record)
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                self.store.set(ns::RECORDS, key, &json)?;
            }
        }
        if changed.sync {
            let doc = SyncDoc {
                sync: self.state.sync.clone(),
                removed_record_keys: self.state.removed_record_keys.clone(),
            };
            set_doc(&self.store, ns::SYNC, &doc)?;
        }
        Ok(())
    }

    /// Reflect the change into the directory mirror. Mirror failures are
    /// logged and swallowed; the mirror is a recovery surface, not a
    /// source of truth.
    fn mirror_changes(&self, changed: &Changed) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        let snapshot = &self.state.snapshot;
        let collections: [(&str, bool, fn(&Snapshot) -> serde_json::Result<String>); 5] = [
            (ns::COURSES, changed.courses, |s| {
                serde_json::to_string_pretty(&s.courses)
            }),
            (ns::PROGRESS, changed.progress, |s| {
                serde_json::to_string_pretty(&s.progress)
            }),
            (ns::ITEMS, changed.items, |s| {
                serde_json::to_string_pretty(&s.items)
            }),
            (ns::VOCABULARY, changed.vocabulary, |s| {
                serde_json::to_string_pretty(&s.vocabulary)
            }),
            (ns::EXPORTED, changed.exported, |s| {
                serde_json::to_string_pretty(&s.exported_words)
            }),
        ];
        for (namespace, was_changed, render) in collections {
            if !was_changed {
                continue;
            }
            match render(snapshot) {
                Ok(json) => {
                    if let Err(err) = mirror.mirror_collection(namespace, &json) {
                        warn!(namespace, %err, "mirror write failed");
                    }
                }
                Err(err) => warn!(namespace, %err, "mirror serialization failed"),
            }
        }
        if !changed.records_written.is_empty() {
            if let Err(err) = mirror.mirror_records(&snapshot.records) {
                warn!(%err, "mirror records write failed");
            }
        }
        // Deleted keys leave the mirror too; evicted keys stay, the
        // mirror is one of the backups eviction relies on.
        if !changed.records_deleted.is_empty() {
            if let Err(err) = mirror.remove_records(&changed.records_deleted) {
                warn!(%err, "mirror records prune failed");
            }
        }
    }
}

fn set_doc<S: KeyValueStore, T: Serialize>(
    store: &S,
    namespace: &str,
    value: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(value).map_err(|e| StoreError::InvalidData(e.to_string()))?;
    store.set(namespace, ns::ALL, &json)
}

fn get_doc<S: KeyValueStore, T: for<'de> Deserialize<'de> + Default>(
    store: &S,
    namespace: &str,
) -> Result<T, StoreError> {
    match store.get(namespace, ns::ALL)? {
        Some(json) => {
            serde_json::from_str(&json).map_err(|e| StoreError::InvalidData(e.to_string()))
        }
        None => Ok(T::default()),
    }
}

/// Load the full persisted state.
pub fn load<S: KeyValueStore>(store: &S) -> Result<CoreState, StoreError> {
    let mut records: BTreeMap<String, ContentRecord> = BTreeMap::new();
    for key in store.keys(ns::RECORDS)? {
        if let Some(json) = store.get(ns::RECORDS, &key)? {
            let record = serde_json::from_str(&json)
                .map_err(|e| StoreError::InvalidData(format!("record {key}: {e}")))?;
            records.insert(key, record);
        }
    }
    let sync_doc: SyncDoc = get_doc(store, ns::SYNC)?;
    let evicted: BTreeSet<String> = get_doc(store, ns::EVICTED)?;

    Ok(CoreState {
        snapshot: Snapshot {
            courses: get_doc(store, ns::COURSES)?,
            progress: get_doc(store, ns::PROGRESS)?,
            items: get_doc(store, ns::ITEMS)?,
            records,
            vocabulary: get_doc(store, ns::VOCABULARY)?,
            exported_words: get_doc(store, ns::EXPORTED)?,
        },
        evicted,
        sync: sync_doc.sync,
        removed_record_keys: sync_doc.removed_record_keys,
    })
}
