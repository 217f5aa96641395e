//! Local persistent store: a generic namespaced get/set/delete abstraction.
//!
//! Every other component reads and writes only through [`KeyValueStore`],
//! never against a concrete backend, so the same logic runs against any
//! key/value medium.

pub mod error;
pub mod schema;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::SqliteStore;

type Result<T> = std::result::Result<T, StoreError>;

/// Namespace names for the persisted local layout.
pub mod ns {
    pub const COURSES: &str = "courses";
    pub const PROGRESS: &str = "progress";
    pub const ITEMS: &str = "items";
    pub const RECORDS: &str = "records";
    pub const VOCABULARY: &str = "vocabulary";
    pub const EXPORTED: &str = "exported";
    pub const EVICTED: &str = "evicted";
    pub const SYNC: &str = "sync";

    /// Key under which whole-collection namespaces store their document.
    pub const ALL: &str = "all";
}

/// Contract every physical backend satisfies.
pub trait KeyValueStore: Send {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Store a value. On quota failure this returns
    /// [`StoreError::QuotaExceeded`] and leaves the previous value intact;
    /// it never silently truncates.
    fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    fn keys(&self, namespace: &str) -> Result<Vec<String>>;

    /// Approximate bytes currently stored.
    fn size_estimate(&self) -> Result<u64>;
}
