//! Workspace glue errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading workspace files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    /// A requested file name matched nothing under the root.
    #[error("File not found in the project: {0}")]
    NotFound(String),

    /// A file was found but could not be read.
    #[error("failed to read {path}: {message}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error text.
        message: String,
    },
}

impl WorkspaceError {
    pub(crate) fn read(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}
