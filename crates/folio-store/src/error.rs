use folio_types::{RevisionId, TypeError};

/// Errors from store and backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key or revision was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Declared metadata does not match the stored bytes.
    #[error("validation failed for {field}: declared {declared}, computed {computed}")]
    Validation {
        field: &'static str,
        declared: String,
        computed: String,
    },

    /// No backend is registered for the namespace.
    #[error("no backend for namespace {0:?}")]
    NoBackend(String),

    /// A backend name that the routing table does not know.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// The key cannot be used by this store.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Stored metadata could not be decoded.
    #[error("corrupt metadata for {revid}: {source}")]
    CorruptMeta {
        revid: RevisionId,
        #[source]
        source: TypeError,
    },

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] TypeError),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the embedded database.
    #[error("database error: {0}")]
    Database(#[from] redb::Error),
}

impl StoreError {
    /// Returns `true` for the recoverable not-found case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
