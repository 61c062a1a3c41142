//! Typed error hierarchy for devwp.
//!
//! A single `DevwpError` enum covers every failure kind a caller may want to
//! branch on. Validation errors are raised before any side effect; store,
//! reload and subprocess errors abort whatever sequence they occur in.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevwpError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Site directory already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Config store error: {0}")]
    Store(String),

    #[error("Proxy reload failed: {0}")]
    Reload(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    ExitCode { code: i32, message: String },

    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DevwpError {
    /// Build an exit-code error from a finished process. Trimmed stderr wins
    /// over the generic message.
    pub fn exit_code(program: &str, code: i32, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("{} exited with code {}", program, code)
        } else {
            stderr.to_string()
        };
        DevwpError::ExitCode { code, message }
    }

    /// Classify an I/O error: `NotFound` is kept apart so callers can treat a
    /// missing file as an expected state.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            DevwpError::NotFound { path }
        } else {
            DevwpError::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DevwpError::NotFound { .. })
    }
}

impl From<rusqlite::Error> for DevwpError {
    fn from(err: rusqlite::Error) -> Self {
        DevwpError::Store(err.to_string())
    }
}

pub type Result<T, E = DevwpError> = std::result::Result<T, E>;
