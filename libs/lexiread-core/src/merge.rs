//! Deterministic, field-level reconciliation of two snapshots.
//!
//! Merge direction is always union: no key or entry present in either
//! input is absent from the output, and no union field ever shrinks.
//! On a course/item/record id collision the local copy wins whole. The
//! local side is assumed to be the actively-edited one, and without
//! per-field timestamps there is no safe finer-grained rule.

use crate::types::{record_keys, PendingMerge, Snapshot};

/// Counts of what the merge pulled in from the remote side, for the
/// one-line summary surfaced after startup reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MergeStats {
    pub courses_added: usize,
    pub items_added: usize,
    pub records_added: usize,
    pub words_added: usize,
    pub words_updated: usize,
}

impl MergeStats {
    pub fn summary(&self) -> String {
        format!(
            "merged remote copy: {} courses, {} items, {} records, {} words added, {} words updated",
            self.courses_added,
            self.items_added,
            self.records_added,
            self.words_added,
            self.words_updated
        )
    }
}

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub snapshot: Snapshot,
    pub stats: MergeStats,
}

/// Merge `remote` into `local`, producing a snapshot that dominates both.
pub fn merge(local: &Snapshot, remote: &Snapshot) -> MergeOutcome {
    let mut merged = local.clone();
    let mut stats = MergeStats::default();

    // Courses, items, records: union by key, local wins on collision.
    for (id, course) in &remote.courses {
        if !merged.courses.contains_key(id) {
            merged.courses.insert(id.clone(), course.clone());
            stats.courses_added += 1;
        }
    }
    for (key, item) in &remote.items {
        if !merged.items.contains_key(key) {
            merged.items.insert(key.clone(), item.clone());
            stats.items_added += 1;
        }
    }
    for (key, record) in &remote.records {
        if !merged.records.contains_key(key) {
            merged.records.insert(key.clone(), record.clone());
            stats.records_added += 1;
        }
    }

    // Vocabulary: per-word union, larger date_added wins, ties favor local.
    for (key, remote_entry) in &remote.vocabulary {
        match merged.vocabulary.get(key) {
            None => {
                merged.vocabulary.insert(key.clone(), remote_entry.clone());
                stats.words_added += 1;
            }
            Some(local_entry) if remote_entry.date_added > local_entry.date_added => {
                merged.vocabulary.insert(key.clone(), remote_entry.clone());
                stats.words_updated += 1;
            }
            Some(_) => {}
        }
    }

    // Exported set: plain union.
    merged
        .exported_words
        .extend(remote.exported_words.iter().cloned());

    // Progress: max index, union of completed lessons. Safe because the
    // index only moves forward and completion is monotonic.
    for (course_id, remote_progress) in &remote.progress {
        let entry = merged.progress.entry(course_id.clone()).or_default();
        entry.current_lesson_index = entry
            .current_lesson_index
            .max(remote_progress.current_lesson_index);
        entry
            .completed_lessons
            .extend(remote_progress.completed_lessons.iter().copied());
    }

    MergeOutcome {
        snapshot: merged,
        stats,
    }
}

/// Restore the pre-merge snapshot, preserving work created after it was
/// taken: any course or item in `current` whose `created_at` exceeds the
/// snapshot timestamp and is missing from the snapshot is re-added along
/// with its progress and content records.
pub fn revert(current: &Snapshot, pending: &PendingMerge) -> Snapshot {
    let mut restored = pending.snapshot.clone();

    for (id, course) in &current.courses {
        if course.created_at > pending.taken_at && !restored.courses.contains_key(id) {
            restored.courses.insert(id.clone(), course.clone());
            if let Some(progress) = current.progress.get(id) {
                restored.progress.insert(id.clone(), progress.clone());
            }
            let prefix = record_keys::course_prefix(id);
            for (key, record) in &current.records {
                if key.starts_with(&prefix) {
                    restored.records.insert(key.clone(), record.clone());
                }
            }
        }
    }

    for (key, item) in &current.items {
        if item.created_at > pending.taken_at && !restored.items.contains_key(key) {
            restored.items.insert(key.clone(), item.clone());
            if let Some(record) = current.records.get(key) {
                restored.records.insert(key.clone(), record.clone());
            }
        }
    }

    restored
}
