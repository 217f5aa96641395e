//! Core snapshot types for the lexiread library.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current time in epoch milliseconds. All timestamps in the data model
/// use this resolution.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// One lesson inside a course plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub number: u32,
    pub title_target: String,
    pub title_english: String,
    pub description: String,
    #[serde(default)]
    pub focus_keywords: Vec<String>,
}

/// A generated course: an ordered lesson plan plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub topic: String,
    pub level: String,
    pub language_id: String,
    pub summary: String,
    pub lessons: Vec<Lesson>,
    pub created_at: i64,
    #[serde(default)]
    pub archived: bool,
}

/// Completion progress for one course, keyed by course id.
///
/// `current_lesson_index` only moves forward and `completed_lessons`
/// only grows, which is what makes progress merging safe.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CourseProgress {
    pub current_lesson_index: usize,
    #[serde(default)]
    pub completed_lessons: BTreeSet<usize>,
}

/// A standalone generated item, independent of any course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandaloneItem {
    pub key: String,
    pub topic: String,
    pub level: String,
    pub language_id: String,
    pub created_at: i64,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_english: Option<String>,
}

/// A structured sub-list inside a generated payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentSection {
    pub heading: String,
    pub entries: Vec<String>,
}

/// Grading result for one user answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grading {
    pub score: f64,
    pub feedback: String,
}

/// The generated payload for one lesson or standalone item.
///
/// This is the large entity under quota pressure; everything else in the
/// snapshot is lightweight metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentRecord {
    pub body: String,
    #[serde(default)]
    pub sections: Vec<ContentSection>,
    #[serde(default)]
    pub user_answers: BTreeMap<String, String>,
    #[serde(default)]
    pub gradings: BTreeMap<String, Grading>,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    /// LRU timestamp, bumped when the item is opened.
    #[serde(default)]
    pub last_opened_at: i64,
}

/// Spaced-repetition scheduling state for one vocabulary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrsState {
    pub interval_days: f64,
    pub ease_factor: f64,
    pub due_at: i64,
    pub lapses: u32,
}

impl Default for SrsState {
    fn default() -> Self {
        Self {
            interval_days: 0.0,
            ease_factor: 2.5,
            due_at: 0,
            lapses: 0,
        }
    }
}

/// A learned word or phrase in the vocabulary ledger.
///
/// Created on first exposure and never overwritten by later generation of
/// the same word; only explicit review updates mutate it afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub word: String,
    pub language_id: String,
    pub romanization: String,
    pub translation: String,
    pub date_added: i64,
    #[serde(default)]
    pub srs: SrsState,
}

impl VocabularyEntry {
    /// Map key scoping the word by language, so the same spelling in two
    /// languages never collides.
    pub fn key(&self) -> String {
        vocab_key(&self.language_id, &self.word)
    }
}

/// Key for a vocabulary entry: `"{language_id}:{word}"`.
pub fn vocab_key(language_id: &str, word: &str) -> String {
    format!("{}:{}", language_id, word)
}

/// Content-record key helpers.
pub mod record_keys {
    /// Record key for one lesson of a course.
    pub fn lesson(course_id: &str, lesson_number: u32) -> String {
        format!("{}/lesson-{}", course_id, lesson_number)
    }

    /// Prefix owning every lesson record of a course.
    pub fn course_prefix(course_id: &str) -> String {
        format!("{}/", course_id)
    }
}

/// A full-value copy of all syncable entities at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub courses: BTreeMap<String, Course>,
    #[serde(default)]
    pub progress: BTreeMap<String, CourseProgress>,
    #[serde(default)]
    pub items: BTreeMap<String, StandaloneItem>,
    #[serde(default)]
    pub records: BTreeMap<String, ContentRecord>,
    #[serde(default)]
    pub vocabulary: BTreeMap<String, VocabularyEntry>,
    #[serde(default)]
    pub exported_words: BTreeSet<String>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
            && self.progress.is_empty()
            && self.items.is_empty()
            && self.records.is_empty()
            && self.vocabulary.is_empty()
            && self.exported_words.is_empty()
    }

    /// Record keys that a course or item in this snapshot accounts for.
    /// Used to decide whether a record key is live.
    pub fn owns_record_key(&self, key: &str) -> bool {
        if self.items.contains_key(key) {
            return true;
        }
        match key.split_once('/') {
            Some((course_id, rest)) => {
                self.courses.get(course_id).is_some_and(|course| {
                    rest.strip_prefix("lesson-")
                        .and_then(|n| n.parse::<u32>().ok())
                        .is_some_and(|n| course.lessons.iter().any(|l| l.number == n))
                })
            }
            None => false,
        }
    }
}

/// The snapshot taken just before a merge was applied, kept so the merge
/// can be reverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMerge {
    pub snapshot: Snapshot,
    pub taken_at: i64,
}

/// Sync bookkeeping persisted beside the snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Bumped on every mutation that touches syncable data.
    #[serde(default)]
    pub last_modified: i64,
    /// Timestamp of the last confirmed successful reconciliation.
    #[serde(default)]
    pub cloud_last_synced: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_merge: Option<PendingMerge>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn course(id: &str, lesson_count: u32) -> Course {
        Course {
            id: id.to_string(),
            topic: "daily life".to_string(),
            level: "A2".to_string(),
            language_id: "ja".to_string(),
            summary: String::new(),
            lessons: (1..=lesson_count)
                .map(|n| Lesson {
                    number: n,
                    title_target: format!("レッスン{}", n),
                    title_english: format!("Lesson {}", n),
                    description: String::new(),
                    focus_keywords: vec![],
                })
                .collect(),
            created_at: 1,
            archived: false,
        }
    }

    #[test]
    fn lesson_record_keys_are_owned_by_their_course() {
        let mut snap = Snapshot::default();
        snap.courses.insert("c1".to_string(), course("c1", 3));

        assert!(snap.owns_record_key(&record_keys::lesson("c1", 2)));
        assert!(!snap.owns_record_key(&record_keys::lesson("c1", 4)));
        assert!(!snap.owns_record_key(&record_keys::lesson("c2", 1)));
    }

    #[test]
    fn item_keys_are_owned_by_their_item() {
        let mut snap = Snapshot::default();
        snap.items.insert(
            "story-abc".to_string(),
            StandaloneItem {
                key: "story-abc".to_string(),
                topic: "folk tale".to_string(),
                level: "B1".to_string(),
                language_id: "ja".to_string(),
                created_at: 1,
                archived: false,
                series_id: None,
                episode_number: None,
                title_target: None,
                title_english: None,
            },
        );

        assert!(snap.owns_record_key("story-abc"));
        assert!(!snap.owns_record_key("story-xyz"));
    }

    #[test]
    fn vocab_key_scopes_by_language() {
        assert_eq!(vocab_key("ja", "猫"), "ja:猫");
        assert_ne!(vocab_key("ja", "猫"), vocab_key("zh", "猫"));
    }

    #[test]
    fn snapshot_fields_default_on_missing_json() {
        // Additive field evolution: old persisted JSON must still read.
        let snap: Snapshot = serde_json::from_str(r#"{"courses":{}}"#).unwrap();
        assert!(snap.is_empty());

        let record: ContentRecord = serde_json::from_str(r#"{"body":"text"}"#).unwrap();
        assert_eq!(record.last_opened_at, 0);
        assert!(record.translations.is_empty());
    }
}
