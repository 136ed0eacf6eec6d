//! Engine error taxonomy
//!
//! Every fallible engine operation returns [`EngineError`]. Callers match on
//! [`EngineError::kind`] (or read [`EngineError::status_code`]) instead of
//! inspecting message text.

use serde::Serialize;

use crate::db::DbError;

/// Coarse classification of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input (sha, path, branch name)
    Validation,
    /// The repository or branch is not in a state that allows the operation
    Precondition,
    /// A referenced branch, commit or file does not exist
    NotFound,
    /// A subprocess, filesystem or database step failed mid-operation
    Operation,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::Precondition => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Operation => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Precondition => "precondition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Operation => "operation",
        }
    }
}

/// Error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Operation(String),

    #[error("git {command} failed (exit {exit_code}): {stderr}")]
    Git {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] DbError),

    /// An operation failed and restoring the last safe point failed as well
    #[error("{original}; rollback failed: {rollback}")]
    RollbackFailed {
        original: Box<EngineError>,
        rollback: String,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Precondition(_) => ErrorKind::Precondition,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Db(DbError::Validation(_)) => ErrorKind::Validation,
            EngineError::Operation(_)
            | EngineError::Git { .. }
            | EngineError::Io(_)
            | EngineError::Db(_)
            | EngineError::RollbackFailed { .. } => ErrorKind::Operation,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Serializable `{kind, message, status_code}` view for transports
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            status_code: self.status_code(),
        }
    }
}

/// Wire shape of an engine error
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: u16,
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Run a best-effort read: failures are logged and collapse to `None`.
///
/// Used on paths that back read-only views (history listing, index probes)
/// where availability matters more than strictness.
pub fn advisory<T>(context: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(context, error = %e, "advisory read failed, degrading");
            None
        }
    }
}
