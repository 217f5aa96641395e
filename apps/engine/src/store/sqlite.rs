//! SQLite implementation of the key/value store contract.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::error::StoreError;
use super::KeyValueStore;

type Result<T> = std::result::Result<T, StoreError>;

/// Namespaced key/value store over a single SQLite table, with an optional
/// byte budget enforced on writes.
pub struct SqliteStore {
    conn: Connection,
    budget_bytes: Option<u64>,
}

impl SqliteStore {
    /// Open the store at `path`, creating it if necessary.
    pub fn open<P: AsRef<Path>>(path: P, budget_bytes: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn, budget_bytes };
        store.initialize()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory(budget_bytes: Option<u64>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, budget_bytes };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(super::schema::SCHEMA)?;
        Ok(())
    }

    fn existing_len(&self, namespace: &str, key: &str) -> Result<u64> {
        let len: Option<i64> = self
            .conn
            .query_row(
                "SELECT length(value) FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(len.unwrap_or(0) as u64)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        if let Some(budget) = self.budget_bytes {
            let current = self.size_estimate()?;
            let replaced = self.existing_len(namespace, key)?;
            let attempted = current - replaced.min(current) + value.len() as u64;
            if attempted > budget {
                return Err(StoreError::QuotaExceeded { attempted, budget });
            }
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)",
            params![namespace, key, value],
        )?;
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE namespace = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![namespace], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn size_estimate(&self) -> Result<u64> {
        let bytes: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(length(value) + length(key)), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(bytes as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ns;

    #[test]
    fn set_get_delete_round_trip() {
        let store = SqliteStore::open_in_memory(None).unwrap();

        store.set(ns::COURSES, ns::ALL, "{\"c1\":1}").unwrap();
        assert_eq!(
            store.get(ns::COURSES, ns::ALL).unwrap().as_deref(),
            Some("{\"c1\":1}")
        );

        store.delete(ns::COURSES, ns::ALL).unwrap();
        assert_eq!(store.get(ns::COURSES, ns::ALL).unwrap(), None);
    }

    #[test]
    fn namespaces_do_not_collide() {
        let store = SqliteStore::open_in_memory(None).unwrap();
        store.set(ns::RECORDS, "k", "record").unwrap();
        store.set(ns::EVICTED, "k", "evicted").unwrap();

        assert_eq!(store.get(ns::RECORDS, "k").unwrap().as_deref(), Some("record"));
        assert_eq!(store.get(ns::EVICTED, "k").unwrap().as_deref(), Some("evicted"));
        assert_eq!(store.keys(ns::RECORDS).unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn quota_rejects_whole_write_and_keeps_old_value() {
        let store = SqliteStore::open_in_memory(Some(64)).unwrap();
        store.set(ns::RECORDS, "k", "small").unwrap();

        let big = "x".repeat(200);
        let err = store.set(ns::RECORDS, "k", &big).unwrap_err();
        assert!(err.is_quota());

        // Previous value untouched; nothing truncated.
        assert_eq!(store.get(ns::RECORDS, "k").unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn quota_accounts_for_replaced_value() {
        let store = SqliteStore::open_in_memory(Some(64)).unwrap();
        let half = "y".repeat(40);
        store.set(ns::RECORDS, "k", &half).unwrap();

        // Replacing in place stays within budget even though
        // old + new together would not.
        let other = "z".repeat(40);
        store.set(ns::RECORDS, "k", &other).unwrap();
        assert_eq!(store.get(ns::RECORDS, "k").unwrap().as_deref(), Some(other.as_str()));
    }

    #[test]
    fn size_estimate_tracks_contents() {
        let store = SqliteStore::open_in_memory(None).unwrap();
        assert_eq!(store.size_estimate().unwrap(), 0);

        store.set(ns::RECORDS, "key1", "0123456789").unwrap();
        assert!(store.size_estimate().unwrap() >= 10);
    }
}
