//! Validation error types.

use thiserror::Error;

/// One rejected metadata field.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Metadata rejected by the schema. Carries every failing field, not just
/// the first.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid metadata: {}", join(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    /// Error for a single field.
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError::new(field, reason)],
        }
    }

    /// Whether `field` is among the rejected fields.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

fn join(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;
