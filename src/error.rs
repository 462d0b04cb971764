//! Error kinds, split by who is at fault.
//!
//! Authorization decisions are boolean outputs, never exceptions:
//! `check` never returns `CoreError` for a denied check, a missing schema
//! on read, a cycle, or depth exhaustion. Those fold into `false` inside
//! `check` itself. `CoreError` is reserved for writes and programmer
//! mistakes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("relation config not found for {object_type}#{relation}")]
    RelationConfigNotFound {
        object_type: String,
        relation: String,
    },

    #[error("subject type '{subject_type}' is not allowed on {object_type}#{relation}; allowed: {allowed:?}")]
    InvalidSubjectType {
        object_type: String,
        relation: String,
        subject_type: String,
        allowed: Vec<String>,
    },

    #[error("userset subjects are not allowed on {object_type}#{relation}")]
    UsersetNotAllowed {
        object_type: String,
        relation: String,
    },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("condition '{0}' not found")]
    ConditionNotFound(String),

    #[error("condition evaluation error: {0}")]
    ConditionEvaluationError(#[from] crate::condition::ConditionError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}
