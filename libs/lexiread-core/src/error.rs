//! Error types for lexiread-core.

use thiserror::Error;

/// Result type alias using SnapshotError.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors raised while validating a snapshot, typically when importing a
/// user-supplied backup file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed backup file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("content record {key} does not belong to any course lesson or item")]
    DanglingRecord { key: String },

    #[error("progress entry references missing course {course_id}")]
    DanglingProgress { course_id: String },

    #[error("progress for course {course_id} references lesson index {index} of {lesson_count}")]
    ProgressOutOfRange {
        course_id: String,
        index: usize,
        lesson_count: usize,
    },

    #[error("vocabulary entry under key {key} does not match its own word/language")]
    MismatchedVocabularyKey { key: String },
}
