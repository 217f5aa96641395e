//! Test fixtures and factory functions for creating test data.

use serde_json::{json, Value};

use lexiread_backend::models::{ContentRecord, Snapshot};
use lexiread_core::types::{record_keys, Course, Lesson, VocabularyEntry};

/// Build a course with the given id and number of lessons.
pub fn course(id: &str, lesson_count: u32) -> Course {
    Course {
        id: id.to_string(),
        topic: format!("Topic for {id}"),
        level: "B1".to_string(),
        language_id: "ja".to_string(),
        summary: String::new(),
        lessons: (1..=lesson_count)
            .map(|n| Lesson {
                number: n,
                title_target: format!("レッスン{n}"),
                title_english: format!("Lesson {n}"),
                description: String::new(),
                focus_keywords: vec![],
            })
            .collect(),
        created_at: 1_700_000_000_000,
        archived: false,
    }
}

/// Build a vocabulary entry keyed under "ja:{word}".
pub fn word(word: &str, date_added: i64) -> VocabularyEntry {
    VocabularyEntry {
        word: word.to_string(),
        language_id: "ja".to_string(),
        romanization: String::new(),
        translation: format!("translation of {word}"),
        date_added,
        srs: Default::default(),
    }
}

/// A snapshot with one course, a content record per lesson, and a word.
pub fn sample_snapshot(course_id: &str, lesson_count: u32) -> Snapshot {
    let mut snapshot = Snapshot::default();
    let c = course(course_id, lesson_count);
    for lesson in &c.lessons {
        snapshot.records.insert(
            record_keys::lesson(course_id, lesson.number),
            ContentRecord {
                body: format!("Generated body for lesson {}", lesson.number),
                ..Default::default()
            },
        );
    }
    snapshot.progress.insert(course_id.to_string(), Default::default());
    snapshot.courses.insert(course_id.to_string(), c);
    let entry = word("猫", 1_700_000_000_000);
    snapshot.vocabulary.insert(entry.key(), entry);
    snapshot
}

/// Build a push request body.
pub fn push_request(snapshot: &Snapshot, removed: &[&str], updated_at: i64) -> Value {
    json!({
        "snapshot": snapshot,
        "removed_record_keys": removed,
        "updated_at": updated_at,
    })
}
