//! Error types for the gate crate.

use crate::rights::Right;

/// Errors raised by the protecting middleware.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The ACLs in effect do not grant the right.
    #[error("access denied: {target} does not allow {right} for {users}")]
    AccessDenied {
        right: String,
        target: String,
        users: String,
    },

    /// ACL configuration is invalid or has no entry for a namespace.
    #[error("acl configuration error: {0}")]
    Config(String),

    /// The underlying indexing layer failed.
    #[error(transparent)]
    Index(#[from] folio_index::IndexError),
}

impl GateError {
    pub(crate) fn denied(rights: &[Right], target: impl Into<String>, users: &[String]) -> Self {
        Self::AccessDenied {
            right: rights
                .iter()
                .map(Right::as_str)
                .collect::<Vec<_>>()
                .join(" or "),
            target: target.into(),
            users: if users.is_empty() {
                "anonymous".into()
            } else {
                users.join(", ")
            },
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Index(e) if e.is_not_found())
    }
}

/// Convenience alias for gate results.
pub type GateResult<T> = Result<T, GateError>;
