//! Cheap divergence detection between a local and a remote snapshot.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::Snapshot;

/// Report produced when local and remote snapshots diverge.
///
/// The counts and `remote_newer` flag feed user-facing messaging only;
/// merge direction is always union, never last-writer-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub local_courses: usize,
    pub remote_courses: usize,
    pub local_words: usize,
    pub remote_words: usize,
    pub remote_newer: bool,
}

/// The syncable subset that participates in the fingerprint. Content
/// records are deliberately excluded: they are large, and any change to
/// them also touches course/item metadata or answers stored here.
#[derive(Serialize)]
struct SyncableSubset<'a> {
    courses: &'a std::collections::BTreeMap<String, crate::types::Course>,
    progress: &'a std::collections::BTreeMap<String, crate::types::CourseProgress>,
    items: &'a std::collections::BTreeMap<String, crate::types::StandaloneItem>,
    vocabulary: &'a std::collections::BTreeMap<String, crate::types::VocabularyEntry>,
    exported_words: &'a std::collections::BTreeSet<String>,
}

/// Content hash of the syncable subset of a snapshot. BTree collections
/// serialize in key order, so equal contents always hash equal.
pub fn fingerprint(snapshot: &Snapshot) -> String {
    let subset = SyncableSubset {
        courses: &snapshot.courses,
        progress: &snapshot.progress,
        items: &snapshot.items,
        vocabulary: &snapshot.vocabulary,
        exported_words: &snapshot.exported_words,
    };
    // Serialization of plain maps and strings cannot fail.
    let json = serde_json::to_vec(&subset).expect("snapshot subset serializes");
    let mut hasher = Sha256::new();
    hasher.update(&json);
    format!("{:x}", hasher.finalize())
}

/// Compare a local snapshot against the remote copy.
///
/// Returns `None` when the syncable subsets are identical (the caller
/// just advances its `cloud_last_synced` marker), or a [`ConflictReport`]
/// when a merge is needed.
pub fn detect(
    local: &Snapshot,
    local_last_modified: i64,
    remote: &Snapshot,
    remote_updated_at: i64,
) -> Option<ConflictReport> {
    if fingerprint(local) == fingerprint(remote) {
        return None;
    }

    Some(ConflictReport {
        local_courses: local.courses.len(),
        remote_courses: remote.courses.len(),
        local_words: local.vocabulary.len(),
        remote_words: remote.vocabulary.len(),
        remote_newer: remote_updated_at > local_last_modified,
    })
}
