use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("revision {revid} has no size in its metadata")]
    MissingSize { revid: String },

    #[error("truncated payload for {revid}: expected {expected} bytes, got {actual}")]
    Truncated {
        revid: String,
        expected: u64,
        actual: u64,
    },

    #[error("truncated record header: {0} of 4 bytes")]
    TruncatedHeader(usize),

    #[error("record metadata of {len} bytes exceeds the {max} byte limit")]
    MetaTooLarge { len: u32, max: u32 },

    #[error("truncated record metadata: expected {expected} bytes, got {actual}")]
    TruncatedMeta { expected: u32, actual: usize },

    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] folio_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
