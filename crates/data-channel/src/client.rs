//! Handshake client (collector side).
//!
//! Connects to the collection server, announces the uploader name and
//! waits for the server's verdict. Only an exact `OK` opens the session.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use logcollector_status::StatusSink;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::DataChannelError;
use crate::wire::{CLOSED_REPLY, HANDSHAKE_OK, read_text_line, write_uploader_name};
use crate::{HANDSHAKE_REPLY_TIMEOUT, TCP_BUFFER_SIZE, TCP_CONNECT_TIMEOUT};

/// Timeouts applied before the session is established.
///
/// `None` waits forever. Steady-state reads and writes are never timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOptions {
    pub connect_timeout: Option<Duration>,
    pub reply_timeout: Option<Duration>,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Some(TCP_CONNECT_TIMEOUT),
            reply_timeout: Some(HANDSHAKE_REPLY_TIMEOUT),
        }
    }
}

/// An accepted connection, ready for streaming.
pub struct SessionHandle {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl SessionHandle {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Splits into the inbound status reader and the outbound byte channel.
    pub fn into_split(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}

/// Opens collector sessions against a collection server.
pub struct HandshakeClient;

impl HandshakeClient {
    /// Connects to `server` (`host:port`) and performs the handshake.
    ///
    /// An empty `uploader` fails before any network I/O. A reply other than
    /// `OK` fails with [`DataChannelError::HandshakeRejected`] carrying the
    /// reply text, or `"null"` if the server closed without replying.
    pub async fn connect(
        server: &str,
        uploader: &str,
        options: &HandshakeOptions,
        status: &StatusSink,
        cancel: &CancellationToken,
    ) -> Result<SessionHandle, DataChannelError> {
        if uploader.is_empty() {
            return Err(DataChannelError::InvalidUploaderName);
        }

        status.enqueue(format!("Connecting to {server}...")).await;

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = with_timeout(options.connect_timeout, TcpStream::connect(server)) => result?,
        };
        let peer = stream.peer_addr()?;
        info!(%peer, "connected to collection server");

        status.enqueue("Connected! Sending username...").await;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::with_capacity(TCP_BUFFER_SIZE, reader);

        handshake(
            &mut reader,
            &mut writer,
            uploader,
            options.reply_timeout,
            cancel,
        )
        .await?;

        info!(%peer, uploader, "handshake accepted");
        status.enqueue("Ready to collect!").await;

        Ok(SessionHandle {
            reader,
            writer,
            peer,
        })
    }
}

/// Runs the handshake over an already-open stream pair.
pub async fn handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    uploader: &str,
    reply_timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(), DataChannelError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_uploader_name(writer, uploader).await?;
    debug!(uploader, "uploader name sent, awaiting reply");

    let reply = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(DataChannelError::Cancelled);
        }
        result = with_timeout(reply_timeout, read_text_line(reader)) => result?,
    };

    match reply.as_deref() {
        Some(HANDSHAKE_OK) => Ok(()),
        Some(other) => Err(DataChannelError::HandshakeRejected(other.to_string())),
        None => Err(DataChannelError::HandshakeRejected(CLOSED_REPLY.to_string())),
    }
}

async fn with_timeout<T, E, F>(limit: Option<Duration>, fut: F) -> Result<T, DataChannelError>
where
    F: Future<Output = Result<T, E>>,
    DataChannelError: From<E>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DataChannelError::Timeout),
        },
        None => Ok(fut.await?),
    }
}
