// File: ./src/error.rs
//! Structural failures that stop an export run.
//!
//! Remote-call failures never show up here: the runner absorbs them per row.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    /// A continuation found no source reference in the checkpoint.
    #[error("no export in progress: the checkpoint has no source reference")]
    MissingSource,

    /// The checkpoint exists but cannot be trusted (unparseable fields,
    /// wrong source, unreadable sheet).
    #[error("checkpoint is inconsistent: {0}")]
    Inconsistent(String),

    #[error("sheet is missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RunResult<T> = Result<T, RunError>;
