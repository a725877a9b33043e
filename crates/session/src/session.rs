//! The collection session.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logcollector_data_channel::{
    CompressingUploader, DEFAULT_PORT, HandshakeClient, HandshakeOptions, ListenerExit,
    ServerMessageListener,
};
use logcollector_status::StatusSink;
use logcollector_tail::{DEFAULT_POLL_INTERVAL, TailReader, TailStats};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// What a session needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub file_path: Option<PathBuf>,
    pub uploader_name: String,
    /// `host:port` of the collection server.
    pub server: String,
    pub poll_interval: Duration,
    pub handshake: HandshakeOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            uploader_name: String::new(),
            server: format!("127.0.0.1:{DEFAULT_PORT}"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            handshake: HandshakeOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(file_path: impl Into<PathBuf>, uploader_name: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            uploader_name: uploader_name.into(),
            ..Self::default()
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_handshake(mut self, options: HandshakeOptions) -> Self {
        self.handshake = options;
        self
    }
}

/// Why a session that did not fail came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The session token was cancelled by the caller.
    Cancelled,
    /// The server closed the connection.
    ServerClosed,
    /// Reading server messages failed.
    ServerError(String),
}

impl From<ListenerExit> for StopReason {
    fn from(exit: ListenerExit) -> Self {
        match exit {
            ListenerExit::Cancelled => StopReason::Cancelled,
            ListenerExit::Closed => StopReason::ServerClosed,
            ListenerExit::Failed(e) => StopReason::ServerError(e),
        }
    }
}

/// Outcome of a session that ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub peer: SocketAddr,
    pub tail: TailStats,
    /// Uncompressed bytes handed to the compressor, terminators included.
    pub bytes_in: u64,
    /// Compressed bytes written to the socket.
    pub bytes_out: u64,
    pub segments: u64,
    pub stop: StopReason,
}

/// One tail-and-upload run against one server.
pub struct CollectionSession {
    config: SessionConfig,
    status: StatusSink,
    cancel: CancellationToken,
}

impl CollectionSession {
    pub fn new(config: SessionConfig, status: StatusSink) -> Self {
        Self::with_cancel(config, status, &CancellationToken::new())
    }

    /// Creates a session stopped together with `parent`.
    ///
    /// The session works on a child token, so the listener ending this
    /// session does not cancel the parent.
    pub fn with_cancel(
        config: SessionConfig,
        status: StatusSink,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            config,
            status,
            cancel: parent.child_token(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token that stops this session when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the session to completion.
    ///
    /// A session runs once. On return its token is cancelled and its status
    /// sink dropped. Every failure is written to the status transcript
    /// before it is returned.
    pub async fn run(self) -> Result<SessionSummary, SessionError> {
        let result = self.collect().await;
        self.cancel.cancel();
        match &result {
            Ok(summary) => {
                if summary.stop == StopReason::Cancelled {
                    self.status.enqueue("Collection stopped.").await;
                }
                info!(
                    lines = summary.tail.lines,
                    batches = summary.tail.batches,
                    bytes_out = summary.bytes_out,
                    stop = ?summary.stop,
                    "session ended"
                );
            }
            Err(e) => {
                warn!(error = %e, "session failed");
                self.status.enqueue(e.status_text()).await;
            }
        }
        result
    }

    async fn collect(&self) -> Result<SessionSummary, SessionError> {
        let path = self.validate()?;

        self.status
            .enqueue(format!("Log is {}", path.display()))
            .await;
        self.status
            .enqueue(format!("Uploading as {}", self.config.uploader_name))
            .await;

        let handle = HandshakeClient::connect(
            &self.config.server,
            &self.config.uploader_name,
            &self.config.handshake,
            &self.status,
            &self.cancel,
        )
        .await?;
        let peer = handle.peer_addr();
        let (reader, writer) = handle.into_split();

        // Running before the first upload so rejections mid-stream show up.
        let listener =
            ServerMessageListener::new(reader, self.status.clone(), self.cancel.clone()).spawn();

        let mut uploader = CompressingUploader::new(writer);
        let tailed = match TailReader::open(path, self.config.poll_interval, self.status.clone())
            .await
        {
            Ok(mut tail) => tail.run(&mut uploader, &self.cancel).await,
            Err(e) => Err(e),
        };

        self.cancel.cancel();
        if let Err(e) = uploader.finish().await {
            debug!(error = %e, "upload stream not finished cleanly");
        }
        let exit = listener
            .await
            .map_err(|e| SessionError::Listener(e.to_string()))?;

        let tail = tailed?;
        Ok(SessionSummary {
            peer,
            tail,
            bytes_in: uploader.bytes_in(),
            bytes_out: uploader.bytes_out(),
            segments: uploader.segments(),
            stop: exit.into(),
        })
    }

    fn validate(&self) -> Result<&Path, SessionError> {
        let path = self
            .config
            .file_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(SessionError::NoFileSelected)?;
        if self.config.uploader_name.is_empty() {
            return Err(SessionError::InvalidUploaderName);
        }
        Ok(path)
    }
}
