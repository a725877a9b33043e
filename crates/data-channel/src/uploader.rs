//! Compressed upload stream.
//!
//! Log lines are fed into a single zlib stream at the highest compression
//! level. [`CompressingUploader::flush`] performs a sync flush: everything
//! written so far becomes decodable on the server side, but the stream
//! stays open for the next batch. Only [`CompressingUploader::finish`]
//! writes the zlib trailer and closes the write half.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::TCP_BUFFER_SIZE;

/// Wraps the outbound byte channel with a continuous zlib compressor.
pub struct CompressingUploader<W> {
    encoder: ZlibEncoder<Vec<u8>>,
    writer: W,
    bytes_in: u64,
    bytes_out: u64,
    segments: u64,
}

impl<W: AsyncWrite + Unpin> CompressingUploader<W> {
    pub fn new(writer: W) -> Self {
        Self {
            encoder: ZlibEncoder::new(Vec::with_capacity(TCP_BUFFER_SIZE), Compression::best()),
            writer,
            bytes_in: 0,
            bytes_out: 0,
            segments: 0,
        }
    }

    /// Feeds raw bytes into the compressor.
    ///
    /// Compressed output is handed to the channel once enough of it has
    /// accumulated; nothing is guaranteed to be decodable before `flush`.
    pub async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.encoder.write_all(bytes)?;
        self.bytes_in += bytes.len() as u64;
        if self.encoder.get_ref().len() >= TCP_BUFFER_SIZE {
            self.drain().await?;
        }
        Ok(())
    }

    /// Emits a self-contained, decodable segment without ending the stream.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.encoder.flush()?;
        self.drain().await?;
        self.writer.flush().await?;
        self.segments += 1;
        debug!(
            segment = self.segments,
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
            "compressed segment flushed"
        );
        Ok(())
    }

    /// Ends the zlib stream and shuts down the write half.
    ///
    /// Nothing may be written afterwards.
    pub async fn finish(&mut self) -> std::io::Result<()> {
        self.encoder.try_finish()?;
        self.drain().await?;
        self.writer.shutdown().await?;
        debug!(
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
            "compressed stream finished"
        );
        Ok(())
    }

    /// Returns the wrapped channel.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Uncompressed bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Compressed bytes handed to the channel so far.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Number of completed flushes.
    pub fn segments(&self) -> u64 {
        self.segments
    }

    async fn drain(&mut self) -> std::io::Result<()> {
        let mut pending = std::mem::take(self.encoder.get_mut());
        if pending.is_empty() {
            return Ok(());
        }
        self.writer.write_all(&pending).await?;
        self.bytes_out += pending.len() as u64;
        trace!(bytes = pending.len(), "compressed bytes written");

        // Hand the allocation back to the encoder.
        pending.clear();
        *self.encoder.get_mut() = pending;
        Ok(())
    }
}
