use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex id {value:?}: {reason}")]
    InvalidId { value: String, reason: String },

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
