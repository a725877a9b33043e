//! Error types for the data channel.

/// Errors produced by the collector's TCP channel.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server refused connection: {0}")]
    HandshakeRejected(String),

    #[error("uploader name must not be empty")]
    InvalidUploaderName,

    #[error("connection timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(String),
}
