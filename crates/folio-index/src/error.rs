//! Error types for the index crate.

use folio_types::RevisionId;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No index is open; call `open` first.
    #[error("index is not open")]
    NotOpen,

    /// The index location holds no index.
    #[error("no index at {0}")]
    NotCreated(String),

    /// An item, revision or document is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// `create_item` for a name that already has an item.
    #[error("item already exists: {0}")]
    ItemAlreadyExists(String),

    /// Storing a revid that is already stored, without `overwrite`.
    #[error("revision {0} already exists (overwrite not requested)")]
    RevisionExists(RevisionId),

    /// A document cannot be indexed (missing revid or itemid).
    #[error("cannot index revision: {0}")]
    InvalidDocument(String),

    /// Uniqueness collision or unreadable index files.
    #[error("index corruption: {0}")]
    Corruption(String),

    /// I/O failure on index storage.
    #[error("index storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Index files could not be encoded or decoded.
    #[error("index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metadata was rejected by the schema.
    #[error(transparent)]
    Validation(#[from] folio_schema::ValidationError),

    /// Backend operation failed.
    #[error("store error: {0}")]
    Store(#[from] folio_store::StoreError),
}

impl IndexError {
    /// Whether this is a recoverable "absent" condition, here or in the backend.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
