//! Destination for tailed lines.

use std::future::Future;
use std::io;

use logcollector_data_channel::CompressingUploader;
use logcollector_data_channel::wire::LINE_TERMINATOR;
use tokio::io::AsyncWrite;

/// Where the tail loop forwards lines.
///
/// The collector implements this on top of [`CompressingUploader`].
/// Keeping it a trait lets the tail logic be tested without a socket.
pub trait LineSink: Send {
    /// Writes one line. `line` carries no terminator; the sink adds `\r\n`.
    fn write_line(&mut self, line: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Makes every line written so far visible to the receiver.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

impl<W: AsyncWrite + Unpin + Send> LineSink for CompressingUploader<W> {
    async fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.write(line).await?;
        self.write(LINE_TERMINATOR).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        CompressingUploader::flush(self).await
    }
}
