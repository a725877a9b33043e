//! Reference collection server (receiving side).
//!
//! Accepts collector connections, reads the uploader name, answers the
//! handshake, and decompresses the upload stream back into log lines.
//! The collector's end-to-end tests run against it, and it doubles as a
//! minimal local receiver.

use std::net::SocketAddr;

use flate2::{Decompress, FlushDecompress, Status};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::TCP_BUFFER_SIZE;
use crate::error::DataChannelError;
use crate::wire::{HANDSHAKE_OK, LINE_TERMINATOR, read_uploader_name, write_text_line};

/// Listening side of the collector protocol.
pub struct CollectionServer {
    listener: TcpListener,
}

impl CollectionServer {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, DataChannelError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "collection server listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DataChannelError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts one connection and reads the uploader name.
    ///
    /// The caller decides whether to [`accept`](PendingUploader::accept) or
    /// [`reject`](PendingUploader::reject) it.
    pub async fn accept(&self) -> Result<PendingUploader, DataChannelError> {
        let (mut stream, peer) = self.listener.accept().await?;
        let uploader = read_uploader_name(&mut stream).await?;
        debug!(%peer, %uploader, "uploader announced");
        Ok(PendingUploader {
            uploader,
            stream,
            peer,
        })
    }
}

/// A connection whose handshake has not been answered yet.
pub struct PendingUploader {
    uploader: String,
    stream: TcpStream,
    peer: SocketAddr,
}

impl PendingUploader {
    pub fn uploader(&self) -> &str {
        &self.uploader
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Replies `OK` and starts receiving.
    pub async fn accept(self) -> Result<UploadReceiver, DataChannelError> {
        let (reader, mut writer) = self.stream.into_split();
        write_text_line(&mut writer, HANDSHAKE_OK).await?;
        info!(peer = %self.peer, uploader = %self.uploader, "uploader accepted");
        Ok(UploadReceiver {
            uploader: self.uploader,
            reader,
            writer,
            inflater: Decompress::new(true),
            carry: Vec::new(),
            finished: false,
        })
    }

    /// Replies with `reason` and closes the connection.
    pub async fn reject(self, reason: &str) -> Result<(), DataChannelError> {
        let (_reader, mut writer) = self.stream.into_split();
        write_text_line(&mut writer, reason).await?;
        info!(peer = %self.peer, uploader = %self.uploader, %reason, "uploader rejected");
        Ok(())
    }
}

/// Receiving end of an accepted session.
pub struct UploadReceiver {
    uploader: String,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    inflater: Decompress,
    carry: Vec<u8>,
    finished: bool,
}

impl UploadReceiver {
    pub fn uploader(&self) -> &str {
        &self.uploader
    }

    /// Sends one status line to the collector.
    pub async fn send_status(&mut self, line: &str) -> Result<(), DataChannelError> {
        write_text_line(&mut self.writer, line).await
    }

    /// Waits for the next decompressed batch of complete lines.
    ///
    /// Lines are returned without their `\r\n`. Returns `None` once the
    /// collector has closed the stream; a final line missing its
    /// terminator is reported as a protocol error.
    pub async fn next_lines(&mut self) -> Result<Option<Vec<String>>, DataChannelError> {
        let mut buf = vec![0u8; TCP_BUFFER_SIZE];
        loop {
            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                if !self.carry.is_empty() {
                    return Err(DataChannelError::Protocol(format!(
                        "stream ended inside a line ({} bytes pending)",
                        self.carry.len()
                    )));
                }
                debug!(uploader = %self.uploader, finished = self.finished, "upload stream closed");
                return Ok(None);
            }

            self.inflate(&buf[..n])?;
            let lines = self.take_complete_lines()?;
            if !lines.is_empty() {
                return Ok(Some(lines));
            }
        }
    }

    /// Reads until the collector closes the stream and returns every line.
    pub async fn collect_all(&mut self) -> Result<Vec<String>, DataChannelError> {
        let mut all = Vec::new();
        while let Some(lines) = self.next_lines().await? {
            all.extend(lines);
        }
        Ok(all)
    }

    /// Whether the zlib trailer has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn inflate(&mut self, mut input: &[u8]) -> Result<(), DataChannelError> {
        while !self.finished {
            self.carry.reserve(TCP_BUFFER_SIZE);
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = self
                .inflater
                .decompress_vec(input, &mut self.carry, FlushDecompress::Sync)
                .map_err(|e| DataChannelError::Protocol(format!("corrupt upload stream: {e}")))?;
            let used = (self.inflater.total_in() - before_in) as usize;
            let produced = self.inflater.total_out() - before_out;
            input = &input[used..];

            if status == Status::StreamEnd {
                self.finished = true;
            } else if used == 0 && produced == 0 {
                break;
            }
        }
        if !input.is_empty() {
            warn!(bytes = input.len(), "ignoring bytes after end of compressed stream");
        }
        Ok(())
    }

    fn take_complete_lines(&mut self) -> Result<Vec<String>, DataChannelError> {
        let mut lines = Vec::new();
        while let Some(pos) = self
            .carry
            .windows(LINE_TERMINATOR.len())
            .position(|w| w == LINE_TERMINATOR)
        {
            let rest = self.carry.split_off(pos + LINE_TERMINATOR.len());
            let mut line = std::mem::replace(&mut self.carry, rest);
            line.truncate(pos);
            let line = String::from_utf8(line)
                .map_err(|e| DataChannelError::Protocol(format!("invalid UTF-8 line: {e}")))?;
            lines.push(line);
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::CompressingUploader;
    use crate::wire::{read_text_line, write_uploader_name};
    use tokio::io::BufReader;

    #[tokio::test]
    async fn receives_lines_across_segments() {
        let server = CollectionServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            write_uploader_name(&mut writer, "hana").await.unwrap();
            assert_eq!(
                read_text_line(&mut reader).await.unwrap().as_deref(),
                Some("OK")
            );

            let mut up = CompressingUploader::new(writer);
            up.write(b"alpha\r\nbeta\r\n").await.unwrap();
            up.flush().await.unwrap();
            assert_eq!(
                read_text_line(&mut reader).await.unwrap().as_deref(),
                Some("got 2")
            );
            up.write(b"gamma\r\n").await.unwrap();
            up.flush().await.unwrap();
            up.finish().await.unwrap();
        });

        let pending = server.accept().await.unwrap();
        assert_eq!(pending.uploader(), "hana");
        let mut rx = pending.accept().await.unwrap();

        let first = rx.next_lines().await.unwrap().unwrap();
        assert_eq!(first, vec!["alpha", "beta"]);
        rx.send_status("got 2").await.unwrap();

        let rest = rx.collect_all().await.unwrap();
        assert_eq!(rest, vec!["gamma"]);
        assert!(rx.is_finished());
        client.await.unwrap();
    }

    #[tokio::test]
    async fn reject_sends_reason_and_closes() {
        let server = CollectionServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            write_uploader_name(&mut writer, "ivan").await.unwrap();
            let reply = read_text_line(&mut reader).await.unwrap();
            let after = read_text_line(&mut reader).await.unwrap();
            (reply, after)
        });

        let pending = server.accept().await.unwrap();
        pending.reject("FULL").await.unwrap();

        let (reply, after) = client.await.unwrap();
        assert_eq!(reply.as_deref(), Some("FULL"));
        assert_eq!(after, None);
    }

    #[tokio::test]
    async fn stream_closed_mid_line_is_an_error() {
        let server = CollectionServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            write_uploader_name(&mut writer, "jo").await.unwrap();
            read_text_line(&mut reader).await.unwrap();

            let mut up = CompressingUploader::new(writer);
            up.write(b"no terminator").await.unwrap();
            up.finish().await.unwrap();
        });

        let mut rx = server.accept().await.unwrap().accept().await.unwrap();
        let result = rx.collect_all().await;
        assert!(matches!(result, Err(DataChannelError::Protocol(_))));
        client.await.unwrap();
    }
}
