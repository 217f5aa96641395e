//! The single serialized command path.
//!
//! All state mutation funnels through [`apply`]: user actions, the
//! generation pipeline, and the async sync/eviction tasks all submit
//! commands rather than mutating shared state directly, so no two
//! mutations ever apply out of order. The reducer is pure: it mutates
//! the in-memory state and reports which named slices changed; the engine
//! task persists exactly those slices afterwards.

use std::collections::BTreeSet;

use lexiread_core::merge;
use lexiread_core::types::{
    now_millis, record_keys, ContentRecord, Course, CourseProgress, PendingMerge, Snapshot,
    SrsState, StandaloneItem, SyncState, VocabularyEntry,
};

/// Everything the engine holds in memory: the syncable snapshot, the
/// local-only evicted key set, sync bookkeeping, and tombstones for
/// record keys deleted since the last successful push.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreState {
    pub snapshot: Snapshot,
    pub evicted: BTreeSet<String>,
    pub sync: SyncState,
    pub removed_record_keys: Vec<String>,
}

/// Which named slices a command changed, so persistence is a pure
/// function of the diff rather than a side effect of rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changed {
    pub courses: bool,
    pub progress: bool,
    pub items: bool,
    pub vocabulary: bool,
    pub exported: bool,
    pub evicted: bool,
    pub sync: bool,
    /// Record keys written (persist + mirror).
    pub records_written: Vec<String>,
    /// Record keys deleted with their owner (persist delete + mirror
    /// prune + remote tombstone).
    pub records_deleted: Vec<String>,
    /// Record keys demoted by eviction (persist delete only; every
    /// backup keeps its copy).
    pub records_evicted: Vec<String>,
}

impl Changed {
    pub fn is_empty(&self) -> bool {
        *self == Changed::default()
    }
}

/// Commands accepted by the command path.
#[derive(Debug, Clone)]
pub enum Command {
    // UI / generation pipeline surface.
    CreateCourse(Course),
    DeleteCourse { id: String },
    SetCourseArchived { id: String, archived: bool },
    UpsertItem(StandaloneItem),
    DeleteItem { key: String },
    SetItemArchived { key: String, archived: bool },
    SetRecord { key: String, record: ContentRecord },
    TouchRecord { key: String },
    SetCurrentLesson { course_id: String, index: usize },
    MarkLessonComplete { course_id: String, index: usize },
    AddVocabulary(Vec<VocabularyEntry>),
    ReviewVocabulary { key: String, srs: SrsState },
    MarkWordsExported(Vec<String>),
    /// Replace all entities, e.g. after a validated backup import or
    /// startup hydration from the directory mirror.
    ReplaceAll(Snapshot),
    /// Full local reset (sign-out).
    ResetAll,

    // Submitted by async tasks, never by the UI directly.
    ApplyMergedSnapshot {
        merged: Snapshot,
        pre_merge: PendingMerge,
    },
    RevertMerge,
    MarkEvicted { keys: Vec<String> },
    RestoreRecord { key: String, record: ContentRecord },
    /// A push or no-op reconciliation was confirmed at `at`; the listed
    /// tombstones were delivered and can be dropped.
    SyncCommitted { at: i64, sent_tombstones: Vec<String> },
}

fn bump(state: &mut CoreState, changed: &mut Changed) {
    state.sync.last_modified = now_millis();
    changed.sync = true;
}

/// Apply one command in arrival order. Unknown keys are ignored (the
/// command was racing a delete); the caller logs what it needs.
pub fn apply(state: &mut CoreState, command: Command) -> Changed {
    let mut changed = Changed::default();

    match command {
        Command::CreateCourse(course) => {
            state
                .snapshot
                .progress
                .entry(course.id.clone())
                .or_insert_with(CourseProgress::default);
            state.snapshot.courses.insert(course.id.clone(), course);
            changed.courses = true;
            changed.progress = true;
            bump(state, &mut changed);
        }
        Command::DeleteCourse { id } => {
            if state.snapshot.courses.remove(&id).is_none() {
                return changed;
            }
            state.snapshot.progress.remove(&id);
            let prefix = record_keys::course_prefix(&id);
            let doomed: Vec<String> = state
                .snapshot
                .records
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in &doomed {
                state.snapshot.records.remove(key);
            }
            // Evicted lesson keys are deleted too, not restored.
            let evicted_doomed: Vec<String> = state
                .evicted
                .iter()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in &evicted_doomed {
                state.evicted.remove(key);
                changed.evicted = true;
            }
            let mut all_doomed = doomed;
            all_doomed.extend(evicted_doomed);
            state.removed_record_keys.extend(all_doomed.iter().cloned());
            changed.records_deleted = all_doomed;
            changed.courses = true;
            changed.progress = true;
            bump(state, &mut changed);
        }
        Command::SetCourseArchived { id, archived } => {
            if let Some(course) = state.snapshot.courses.get_mut(&id) {
                course.archived = archived;
                changed.courses = true;
                bump(state, &mut changed);
            }
        }
        Command::UpsertItem(item) => {
            state.snapshot.items.insert(item.key.clone(), item);
            changed.items = true;
            bump(state, &mut changed);
        }
        Command::DeleteItem { key } => {
            if state.snapshot.items.remove(&key).is_none() {
                return changed;
            }
            let mut doomed = Vec::new();
            if state.snapshot.records.remove(&key).is_some() {
                doomed.push(key.clone());
            }
            if state.evicted.remove(&key) {
                doomed.push(key.clone());
                changed.evicted = true;
            }
            state.removed_record_keys.extend(doomed.iter().cloned());
            changed.records_deleted = doomed;
            changed.items = true;
            bump(state, &mut changed);
        }
        Command::SetItemArchived { key, archived } => {
            if let Some(item) = state.snapshot.items.get_mut(&key) {
                item.archived = archived;
                changed.items = true;
                bump(state, &mut changed);
            }
        }
        Command::SetRecord { key, record } => {
            // A record key must belong to a live course lesson or item.
            if !state.snapshot.owns_record_key(&key) {
                return changed;
            }
            state.evicted.remove(&key);
            changed.evicted = true;
            state.snapshot.records.insert(key.clone(), record);
            changed.records_written = vec![key];
            bump(state, &mut changed);
        }
        Command::TouchRecord { key } => {
            if let Some(record) = state.snapshot.records.get_mut(&key) {
                record.last_opened_at = now_millis();
                changed.records_written = vec![key];
                bump(state, &mut changed);
            }
        }
        Command::SetCurrentLesson { course_id, index } => {
            let Some(course) = state.snapshot.courses.get(&course_id) else {
                return changed;
            };
            let clamped = index.min(course.lessons.len().saturating_sub(1));
            let progress = state.snapshot.progress.entry(course_id).or_default();
            // Indices only move forward.
            if clamped > progress.current_lesson_index {
                progress.current_lesson_index = clamped;
                changed.progress = true;
                bump(state, &mut changed);
            }
        }
        Command::MarkLessonComplete { course_id, index } => {
            let Some(course) = state.snapshot.courses.get(&course_id) else {
                return changed;
            };
            if index >= course.lessons.len() {
                return changed;
            }
            let progress = state.snapshot.progress.entry(course_id).or_default();
            if progress.completed_lessons.insert(index) {
                changed.progress = true;
                bump(state, &mut changed);
            }
        }
        Command::AddVocabulary(entries) => {
            // First exposure wins: later generation of the same word never
            // overwrites the existing entry.
            let mut added = false;
            for entry in entries {
                let key = entry.key();
                if !state.snapshot.vocabulary.contains_key(&key) {
                    state.snapshot.vocabulary.insert(key, entry);
                    added = true;
                }
            }
            if added {
                changed.vocabulary = true;
                bump(state, &mut changed);
            }
        }
        Command::ReviewVocabulary { key, srs } => {
            if let Some(entry) = state.snapshot.vocabulary.get_mut(&key) {
                entry.srs = srs;
                changed.vocabulary = true;
                bump(state, &mut changed);
            }
        }
        Command::MarkWordsExported(keys) => {
            let before = state.snapshot.exported_words.len();
            state.snapshot.exported_words.extend(keys);
            if state.snapshot.exported_words.len() != before {
                changed.exported = true;
                bump(state, &mut changed);
            }
        }
        Command::ReplaceAll(snapshot) => {
            changed.records_deleted = state
                .snapshot
                .records
                .keys()
                .filter(|k| !snapshot.records.contains_key(*k))
                .cloned()
                .collect();
            changed.records_written = snapshot.records.keys().cloned().collect();
            state.snapshot = snapshot;
            state.evicted.clear();
            changed.courses = true;
            changed.progress = true;
            changed.items = true;
            changed.vocabulary = true;
            changed.exported = true;
            changed.evicted = true;
            bump(state, &mut changed);
        }
        Command::ResetAll => {
            changed.records_deleted = state.snapshot.records.keys().cloned().collect();
            *state = CoreState::default();
            changed.courses = true;
            changed.progress = true;
            changed.items = true;
            changed.vocabulary = true;
            changed.exported = true;
            changed.evicted = true;
            changed.sync = true;
        }
        Command::ApplyMergedSnapshot { merged, pre_merge } => {
            changed.records_written = merged
                .records
                .keys()
                .filter(|k| !state.snapshot.records.contains_key(*k))
                .cloned()
                .collect();
            // Keys the merge learned about that were evicted locally stay
            // evicted only if the merge did not bring a payload back.
            for key in changed.records_written.iter() {
                state.evicted.remove(key);
            }
            changed.evicted = true;
            state.snapshot = merged;
            state.sync.pending_merge = Some(pre_merge);
            changed.courses = true;
            changed.progress = true;
            changed.items = true;
            changed.vocabulary = true;
            changed.exported = true;
            bump(state, &mut changed);
        }
        Command::RevertMerge => {
            // Clears pending_merge unconditionally, even if absent.
            let Some(pending) = state.sync.pending_merge.take() else {
                changed.sync = true;
                return changed;
            };
            let restored = merge::revert(&state.snapshot, &pending);
            changed.records_deleted = state
                .snapshot
                .records
                .keys()
                .filter(|k| !restored.records.contains_key(*k))
                .cloned()
                .collect();
            changed.records_written = restored.records.keys().cloned().collect();
            // Records the merge brought in must also disappear from the
            // remote copy, or the next merge resurrects them orphaned.
            state
                .removed_record_keys
                .extend(changed.records_deleted.iter().cloned());
            state.evicted.retain(|k| restored.owns_record_key(k));
            state.snapshot = restored;
            changed.courses = true;
            changed.progress = true;
            changed.items = true;
            changed.vocabulary = true;
            changed.exported = true;
            changed.evicted = true;
            bump(state, &mut changed);
        }
        Command::MarkEvicted { keys } => {
            for key in keys {
                if state.snapshot.records.remove(&key).is_some() {
                    state.evicted.insert(key.clone());
                    changed.records_evicted.push(key);
                }
            }
            if !changed.records_evicted.is_empty() {
                changed.evicted = true;
                // Eviction is a local cache decision, not a data change:
                // it must not arm a push.
            }
        }
        Command::RestoreRecord { key, record } => {
            if state.evicted.remove(&key) {
                state.snapshot.records.insert(key.clone(), record);
                changed.records_written = vec![key];
                changed.evicted = true;
            }
        }
        Command::SyncCommitted {
            at,
            sent_tombstones,
        } => {
            state.sync.cloud_last_synced = at;
            state
                .removed_record_keys
                .retain(|k| !sent_tombstones.contains(k));
            changed.sync = true;
        }
    }

    changed
}
