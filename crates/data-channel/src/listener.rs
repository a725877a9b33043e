//! Server message listener.
//!
//! Forwards every line the server sends after the handshake to the status
//! transcript. When the inbound stream ends or fails, the listener reports
//! it and cancels the session token, which stops the tail loop.

use logcollector_status::StatusSink;
use tokio::io::AsyncBufRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::wire::{SERVER_MESSAGE_PREFIX, read_text_line};

/// Transcript line emitted when the server stream ends.
pub const LISTENER_STOPPED_MESSAGE: &str = "Error reading server msg. Collector stopped!";

/// Why the listener returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// The server closed its side of the connection.
    Closed,
    /// Reading failed; the error is reported here and not propagated.
    Failed(String),
    /// The session token was cancelled by someone else.
    Cancelled,
}

/// Background reader for the server's status lines.
pub struct ServerMessageListener<R> {
    reader: R,
    status: StatusSink,
    cancel: CancellationToken,
}

impl<R> ServerMessageListener<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, status: StatusSink, cancel: CancellationToken) -> Self {
        Self {
            reader,
            status,
            cancel,
        }
    }

    /// Runs the listener on its own task. The caller owns the handle and
    /// joins it at shutdown.
    pub fn spawn(self) -> JoinHandle<ListenerExit> {
        tokio::spawn(self.run())
    }

    /// Reads until end of stream, read error, or cancellation.
    pub async fn run(mut self) -> ListenerExit {
        let exit = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break ListenerExit::Cancelled,
                line = read_text_line(&mut self.reader) => match line {
                    Ok(Some(line)) => {
                        debug!(%line, "server message");
                        self.status
                            .enqueue(format!("{SERVER_MESSAGE_PREFIX}{line}"))
                            .await;
                    }
                    Ok(None) => {
                        info!("server closed the connection");
                        break ListenerExit::Closed;
                    }
                    Err(e) => {
                        warn!(error = %e, "error reading server message");
                        break ListenerExit::Failed(e.to_string());
                    }
                },
            }
        };

        if exit != ListenerExit::Cancelled {
            self.status.enqueue(LISTENER_STOPPED_MESSAGE).await;
            self.cancel.cancel();
        }
        exit
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use super::*;
    use logcollector_status::{OverflowPolicy, StatusDrain};
    use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, ReadBuf};

    fn drained(drain: &mut StatusDrain) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(msg) = drain.try_drain() {
            out.push(msg.text().to_string());
        }
        out
    }

    #[tokio::test]
    async fn forwards_lines_then_cancels_on_close() {
        let (sink, mut drain) = logcollector_status::channel(16, OverflowPolicy::Block);
        let cancel = CancellationToken::new();
        let reader = BufReader::new(&b"welcome\r\nslow down\n"[..]);

        let exit = ServerMessageListener::new(reader, sink, cancel.clone())
            .run()
            .await;

        assert_eq!(exit, ListenerExit::Closed);
        assert!(cancel.is_cancelled());
        assert_eq!(
            drained(&mut drain),
            vec!["[S] welcome", "[S] slow down", LISTENER_STOPPED_MESSAGE]
        );
    }

    /// Reader whose every read fails like a reset connection.
    struct ResetReader;

    impl AsyncRead for ResetReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )))
        }
    }

    #[tokio::test]
    async fn read_error_is_swallowed_and_cancels() {
        let (sink, mut drain) = logcollector_status::channel(16, OverflowPolicy::Block);
        let cancel = CancellationToken::new();

        let exit = ServerMessageListener::new(BufReader::new(ResetReader), sink, cancel.clone())
            .run()
            .await;

        assert!(matches!(exit, ListenerExit::Failed(ref e) if e.contains("reset")));
        assert!(cancel.is_cancelled());
        assert_eq!(drained(&mut drain), vec![LISTENER_STOPPED_MESSAGE]);
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_session() {
        let (sink, mut drain) = logcollector_status::channel(16, OverflowPolicy::Block);
        let cancel = CancellationToken::new();
        let reader = BufReader::new(&b"\xff\xfe\nstill here\n"[..]);

        let exit = ServerMessageListener::new(reader, sink, cancel.clone())
            .run()
            .await;

        assert_eq!(exit, ListenerExit::Closed);
        assert_eq!(
            drained(&mut drain),
            vec![
                "[S] \u{FFFD}\u{FFFD}",
                "[S] still here",
                LISTENER_STOPPED_MESSAGE
            ]
        );
    }

    #[tokio::test]
    async fn external_cancel_exits_quietly() {
        let (sink, mut drain) = logcollector_status::channel(16, OverflowPolicy::Block);
        let cancel = CancellationToken::new();
        let (client, mut server) = tokio::io::duplex(256);

        let handle =
            ServerMessageListener::new(BufReader::new(client), sink, cancel.clone()).spawn();

        server.write_all(b"hello\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener should stop promptly")
            .unwrap();
        assert_eq!(exit, ListenerExit::Cancelled);
        assert_eq!(drained(&mut drain), vec!["[S] hello"]);
    }

    #[tokio::test]
    async fn spawned_listener_stops_when_peer_drops() {
        let (sink, _drain) = logcollector_status::channel(16, OverflowPolicy::Block);
        let cancel = CancellationToken::new();
        let (client, server) = tokio::io::duplex(256);

        let handle =
            ServerMessageListener::new(BufReader::new(client), sink, cancel.clone()).spawn();
        drop(server);

        let exit = handle.await.unwrap();
        assert_eq!(exit, ListenerExit::Closed);
        assert!(cancel.is_cancelled());
    }
}
