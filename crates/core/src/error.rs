use std::path::PathBuf;

use thiserror::Error;

/// Outcome of a guarded file operation that did not succeed
///
/// `Denied` and `NotFound` are deliberately separate: a path outside the
/// permitted roots is never reported as missing.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("access not allowed: {}", .0.display())]
    Denied(PathBuf),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("invalid glob pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    #[error("could not decode {} as UTF-8 text", .0.display())]
    Decode(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AccessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;
