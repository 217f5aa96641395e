//! Core library for the lexiread persistence and sync subsystem.
//!
//! Provides:
//! - Snapshot data model (courses, progress, standalone items, generated
//!   content records, vocabulary ledger, exported-word set)
//! - Conflict detector (content-hash comparison of the syncable subset)
//! - Merge engine (deterministic union merge with documented tie-breaks)
//! - Backup export/import with structural validation

pub mod backup;
pub mod conflict;
pub mod error;
pub mod merge;
pub mod types;

pub use conflict::{detect, fingerprint, ConflictReport};
pub use error::{Result, SnapshotError};
pub use merge::{merge, revert, MergeOutcome, MergeStats};
pub use types::{
    now_millis, record_keys, vocab_key, ContentRecord, ContentSection, Course, CourseProgress,
    Grading, Lesson, PendingMerge, Snapshot, SrsState, StandaloneItem, SyncState, VocabularyEntry,
};
