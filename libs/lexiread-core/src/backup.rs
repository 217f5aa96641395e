//! Full-snapshot backup export and import.
//!
//! The exported file is plain human-readable JSON, re-importable by hand,
//! and never includes credentials. Import validates structure before the
//! caller performs any destructive write, so a bad file leaves the
//! original data untouched.

use crate::error::{Result, SnapshotError};
use crate::types::Snapshot;

/// Serialize a snapshot as a downloadable backup.
pub fn export(snapshot: &Snapshot) -> String {
    serde_json::to_string_pretty(snapshot).expect("snapshot serializes")
}

/// Parse and validate a user-supplied backup file.
pub fn import(json: &str) -> Result<Snapshot> {
    let snapshot: Snapshot = serde_json::from_str(json)?;
    validate(&snapshot)?;
    Ok(snapshot)
}

/// Structural validation of snapshot invariants.
pub fn validate(snapshot: &Snapshot) -> Result<()> {
    for key in snapshot.records.keys() {
        if !snapshot.owns_record_key(key) {
            return Err(SnapshotError::DanglingRecord { key: key.clone() });
        }
    }

    for (course_id, progress) in &snapshot.progress {
        let course = snapshot
            .courses
            .get(course_id)
            .ok_or_else(|| SnapshotError::DanglingProgress {
                course_id: course_id.clone(),
            })?;
        let lesson_count = course.lessons.len();
        let max_index = progress
            .completed_lessons
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .max(progress.current_lesson_index);
        if lesson_count > 0 && max_index >= lesson_count {
            return Err(SnapshotError::ProgressOutOfRange {
                course_id: course_id.clone(),
                index: max_index,
                lesson_count,
            });
        }
    }

    for (key, entry) in &snapshot.vocabulary {
        if *key != entry.key() {
            return Err(SnapshotError::MismatchedVocabularyKey { key: key.clone() });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentRecord, Course, CourseProgress, Lesson};
    use pretty_assertions::assert_eq;

    fn course(id: &str, lesson_count: u32) -> Course {
        Course {
            id: id.to_string(),
            topic: "topic".to_string(),
            level: "A1".to_string(),
            language_id: "ja".to_string(),
            summary: String::new(),
            lessons: (1..=lesson_count)
                .map(|n| Lesson {
                    number: n,
                    title_target: String::new(),
                    title_english: String::new(),
                    description: String::new(),
                    focus_keywords: vec![],
                })
                .collect(),
            created_at: 1,
            archived: false,
        }
    }

    #[test]
    fn export_import_round_trip() {
        let mut snap = Snapshot::default();
        snap.courses.insert("c1".to_string(), course("c1", 2));
        snap.progress.insert(
            "c1".to_string(),
            CourseProgress {
                current_lesson_index: 1,
                completed_lessons: [0].into(),
            },
        );
        snap.records.insert(
            crate::types::record_keys::lesson("c1", 1),
            ContentRecord::default(),
        );

        let restored = import(&export(&snap)).unwrap();
        assert_eq!(restored, snap);
    }

    #[test]
    fn reject_non_json_input() {
        assert!(matches!(
            import("definitely not json"),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn reject_dangling_record() {
        let mut snap = Snapshot::default();
        snap.records
            .insert("nobody-owns-this".to_string(), ContentRecord::default());

        assert!(matches!(
            import(&export(&snap)),
            Err(SnapshotError::DanglingRecord { .. })
        ));
    }

    #[test]
    fn reject_progress_for_missing_course() {
        let mut snap = Snapshot::default();
        snap.progress
            .insert("ghost".to_string(), CourseProgress::default());

        assert!(matches!(
            import(&export(&snap)),
            Err(SnapshotError::DanglingProgress { .. })
        ));
    }

    #[test]
    fn reject_progress_past_lesson_count() {
        let mut snap = Snapshot::default();
        snap.courses.insert("c1".to_string(), course("c1", 2));
        snap.progress.insert(
            "c1".to_string(),
            CourseProgress {
                current_lesson_index: 5,
                completed_lessons: Default::default(),
            },
        );

        assert!(matches!(
            import(&export(&snap)),
            Err(SnapshotError::ProgressOutOfRange { .. })
        ));
    }
}
