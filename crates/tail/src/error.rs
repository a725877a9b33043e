//! Tail error types.

use std::path::PathBuf;

/// Errors produced while following a log file.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "{} shrank to {len} bytes after {position} were read (truncated or rotated)",
        path.display()
    )]
    Truncated {
        path: PathBuf,
        position: u64,
        len: u64,
    },

    #[error("{} has a line longer than {limit} bytes", path.display())]
    LineTooLong { path: PathBuf, limit: usize },

    #[error("upload failed: {0}")]
    Sink(#[source] std::io::Error),
}
