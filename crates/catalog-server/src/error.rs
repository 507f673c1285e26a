//! Pipeline error types
//!
//! Two-tier taxonomy: a [`PipelineError`] invalidates an entire job (bad
//! file, unknown job type, store outage); a [`RowError`] is isolated to one
//! spreadsheet row and never escapes the per-row boundary — the dispatcher
//! records it and continues with the next row.

use thiserror::Error;

use crate::spreadsheet::ParseError;

/// Result type alias for job-level operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// An error that aborts the whole job
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job store error: {0}")]
    Store(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),
}

/// An error isolated to a single row
///
/// Converted to a `JobRowError` record with the raw row attached; the job
/// continues and still reaches `completed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Ownership(String),

    #[error("{0}")]
    Lookup(String),

    #[error("{0}")]
    Apply(String),
}

impl RowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RowError::Validation(msg.into())
    }

    pub fn ownership(msg: impl Into<String>) -> Self {
        RowError::Ownership(msg.into())
    }

    pub fn lookup(msg: impl Into<String>) -> Self {
        RowError::Lookup(msg.into())
    }

    pub fn apply(msg: impl Into<String>) -> Self {
        RowError::Apply(msg.into())
    }
}
