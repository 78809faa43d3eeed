//! Translation Error Types
//!
//! Every failure of the schema compiler, the query parser and the backend
//! compilers surfaces here, synchronously, before any backend I/O.

use thiserror::Error;

use super::schema::BackendKind;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Embedding cycle detected: {}", .path.join(" -> "))]
    SchemaCycle { path: Vec<String> },

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    #[error("Invalid schema '{schema}': {reason}")]
    InvalidSchema { schema: String, reason: String },

    #[error("Field '{path}' is not supported on the {backend} backend: {reason}")]
    UnsupportedField {
        path: String,
        backend: BackendKind,
        reason: String,
    },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Operator {operator} is not supported on the {backend} backend: {reason}")]
    UnsupportedOperator {
        operator: String,
        backend: BackendKind,
        reason: String,
    },

    #[error("Relationship '{0}' is read-only; update the related entity directly")]
    ReadOnlyRelationship(String),

    #[error("Conflicting update on '{0}': targeted by more than one instruction")]
    ConflictingUpdate(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TranslateError {
    pub fn unsupported_field(path: impl Into<String>, backend: BackendKind, reason: impl Into<String>) -> Self {
        Self::UnsupportedField {
            path: path.into(),
            backend,
            reason: reason.into(),
        }
    }

    pub fn unsupported_operator(operator: impl Into<String>, backend: BackendKind, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
            backend,
            reason: reason.into(),
        }
    }

    pub fn invalid_schema(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            schema: schema.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
