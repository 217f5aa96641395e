//! Write-through JSON directory mirror.
//!
//! Mirrors store contents into a user-chosen directory, one file per
//! namespace, human-readable and re-importable by hand. Writes are
//! fire-and-forget relative to the command path: a mutation is committed
//! once the persistent store accepts it, and mirror failures are logged
//! and swallowed. The mirror is read authoritatively only at startup
//! hydration (store was empty) and on an explicit restore of an evicted
//! record.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lexiread_core::types::{
    ContentRecord, Course, CourseProgress, Snapshot, StandaloneItem, VocabularyEntry,
};
use thiserror::Error;

use crate::store::ns;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("mirror file {file} is not valid JSON: {source}")]
    Malformed {
        file: String,
        source: serde_json::Error,
    },
}

type Result<T> = std::result::Result<T, MirrorError>;

/// Partial snapshot recovered from mirror files at startup. Each field is
/// independently best-effort; one unreadable file never blocks the rest.
#[derive(Debug, Default)]
pub struct MirrorSnapshot {
    pub courses: Option<BTreeMap<String, Course>>,
    pub progress: Option<BTreeMap<String, CourseProgress>>,
    pub items: Option<BTreeMap<String, StandaloneItem>>,
    pub records: Option<BTreeMap<String, ContentRecord>>,
    pub vocabulary: Option<BTreeMap<String, VocabularyEntry>>,
    pub exported_words: Option<BTreeSet<String>>,
}

impl MirrorSnapshot {
    pub fn is_empty(&self) -> bool {
        self.courses.is_none()
            && self.progress.is_none()
            && self.items.is_none()
            && self.records.is_none()
            && self.vocabulary.is_none()
            && self.exported_words.is_none()
    }

    /// Assemble a snapshot from whatever namespaces were recoverable.
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            courses: self.courses.unwrap_or_default(),
            progress: self.progress.unwrap_or_default(),
            items: self.items.unwrap_or_default(),
            records: self.records.unwrap_or_default(),
            vocabulary: self.vocabulary.unwrap_or_default(),
            exported_words: self.exported_words.unwrap_or_default(),
        }
    }
}

/// Mirror of store contents in a user-granted directory.
pub struct DirectoryMirror {
    root: PathBuf,
}

impl DirectoryMirror {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{}.json", namespace))
    }

    /// Write one namespace's full contents. Idempotent; atomic via a temp
    /// file so a crash never leaves a half-written mirror.
    pub fn mirror_collection(&self, namespace: &str, json: &str) -> Result<()> {
        let target = self.file_for(namespace);
        let tmp = self.root.join(format!(".{}.json.tmp", namespace));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    /// Mirror resident content records as a union with what the file
    /// already holds. Evicted payloads stay in the file; the mirror is a
    /// backup source, so eviction must never erase its own copy. Keys are
    /// only dropped through [`DirectoryMirror::remove_records`].
    pub fn mirror_records(&self, resident: &BTreeMap<String, ContentRecord>) -> Result<()> {
        let mut on_disk = self.read_records().unwrap_or_default();
        for (key, record) in resident {
            on_disk.insert(key.clone(), record.clone());
        }
        let json = serde_json::to_string_pretty(&on_disk).expect("records serialize");
        self.mirror_collection(ns::RECORDS, &json)
    }

    /// Prune explicitly deleted record keys from the mirror.
    pub fn remove_records(&self, keys: &[String]) -> Result<()> {
        let mut on_disk = self.read_records().unwrap_or_default();
        let before = on_disk.len();
        for key in keys {
            on_disk.remove(key);
        }
        if on_disk.len() == before {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&on_disk).expect("records serialize");
        self.mirror_collection(ns::RECORDS, &json)
    }

    fn read_namespace<T: serde::de::DeserializeOwned>(&self, namespace: &str) -> Result<Option<T>> {
        let path = self.file_for(namespace);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let value = serde_json::from_str(&json).map_err(|source| MirrorError::Malformed {
            file: path.display().to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn read_records(&self) -> Result<BTreeMap<String, ContentRecord>> {
        Ok(self.read_namespace(ns::RECORDS)?.unwrap_or_default())
    }

    /// Read whatever the mirror holds, per-file best effort. Used once at
    /// startup to hydrate local state if the persistent store was empty.
    pub fn read_all(&self) -> MirrorSnapshot {
        fn best_effort<T>(what: &str, result: Result<Option<T>>) -> Option<T> {
            match result {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!("skipping unreadable mirror file for {what}: {err}");
                    None
                }
            }
        }

        MirrorSnapshot {
            courses: best_effort(ns::COURSES, self.read_namespace(ns::COURSES)),
            progress: best_effort(ns::PROGRESS, self.read_namespace(ns::PROGRESS)),
            items: best_effort(ns::ITEMS, self.read_namespace(ns::ITEMS)),
            records: best_effort(ns::RECORDS, self.read_namespace(ns::RECORDS)),
            vocabulary: best_effort(ns::VOCABULARY, self.read_namespace(ns::VOCABULARY)),
            exported_words: best_effort(ns::EXPORTED, self.read_namespace(ns::EXPORTED)),
        }
    }

    /// Fetch one content record; the eviction manager's restore path.
    pub fn read_one(&self, key: &str) -> Result<Option<ContentRecord>> {
        Ok(self.read_records()?.remove(key))
    }

    /// Record keys the mirror currently backs up.
    pub fn record_keys(&self) -> Result<BTreeSet<String>> {
        Ok(self.read_records()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_mirror(tag: &str) -> DirectoryMirror {
        let dir = std::env::temp_dir().join(format!(
            "lexiread-mirror-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        DirectoryMirror::new(dir).unwrap()
    }

    fn record(body: &str) -> ContentRecord {
        ContentRecord {
            body: body.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn mirror_and_read_back_a_collection() {
        let mirror = temp_mirror("collection");
        let mut courses: BTreeMap<String, CourseProgress> = BTreeMap::new();
        courses.insert("c1".to_string(), CourseProgress::default());
        let json = serde_json::to_string(&courses).unwrap();

        mirror.mirror_collection(ns::PROGRESS, &json).unwrap();
        let read = mirror.read_all();
        assert_eq!(read.progress.unwrap().len(), 1);
    }

    #[test]
    fn records_union_survives_eviction_rewrites() {
        let mirror = temp_mirror("union");

        let mut resident = BTreeMap::new();
        resident.insert("a".to_string(), record("first"));
        resident.insert("b".to_string(), record("second"));
        mirror.mirror_records(&resident).unwrap();

        // After "a" is evicted locally, only "b" is resident. The mirror
        // must keep "a" anyway.
        let mut resident = BTreeMap::new();
        resident.insert("b".to_string(), record("second edited"));
        mirror.mirror_records(&resident).unwrap();

        assert_eq!(mirror.read_one("a").unwrap().unwrap().body, "first");
        assert_eq!(mirror.read_one("b").unwrap().unwrap().body, "second edited");
        assert_eq!(mirror.record_keys().unwrap().len(), 2);
    }

    #[test]
    fn remove_records_prunes_deleted_keys() {
        let mirror = temp_mirror("remove");
        let mut resident = BTreeMap::new();
        resident.insert("a".to_string(), record("one"));
        resident.insert("b".to_string(), record("two"));
        mirror.mirror_records(&resident).unwrap();

        mirror.remove_records(&["a".to_string()]).unwrap();
        assert!(mirror.read_one("a").unwrap().is_none());
        assert!(mirror.read_one("b").unwrap().is_some());
    }

    #[test]
    fn read_all_on_empty_directory_is_empty() {
        let mirror = temp_mirror("empty");
        assert!(mirror.read_all().is_empty());
        assert!(mirror.read_one("anything").unwrap().is_none());
    }
}
