//! Session error types.

use logcollector_data_channel::DataChannelError;
use logcollector_tail::TailError;

/// Errors that end a collection session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no log file selected")]
    NoFileSelected,

    #[error("uploader name must not be empty")]
    InvalidUploaderName,

    #[error("handshake failed: {0}")]
    Handshake(DataChannelError),

    #[error("tail failed: {0}")]
    Tail(#[from] TailError),

    #[error("listener task failed: {0}")]
    Listener(String),
}

impl From<DataChannelError> for SessionError {
    fn from(e: DataChannelError) -> Self {
        match e {
            DataChannelError::InvalidUploaderName => SessionError::InvalidUploaderName,
            other => SessionError::Handshake(other),
        }
    }
}

impl SessionError {
    /// Transcript line shown to the operator for this failure.
    pub fn status_text(&self) -> String {
        match self {
            SessionError::NoFileSelected => "No log file selected.".to_string(),
            SessionError::InvalidUploaderName => "Bad username.".to_string(),
            SessionError::Handshake(DataChannelError::HandshakeRejected(reason)) => {
                format!("Server refused connection: {reason}")
            }
            other => format!("Collector stopped: {other}"),
        }
    }
}
