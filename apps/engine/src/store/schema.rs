//! SQLite schema for the namespaced key/value store.

/// Complete schema for the local database.
pub const SCHEMA: &str = r#"
-- Namespaced key/value entries; one row per entity collection, except the
-- records namespace which holds one row per content record key.
CREATE TABLE IF NOT EXISTS kv (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (namespace, key)
);

CREATE INDEX IF NOT EXISTS idx_kv_namespace ON kv(namespace);
"#;
