//! Tail loop: skip existing content, discard the first line, forward the
//! rest in batches, idle at end of file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use logcollector_data_channel::wire::strip_line_terminator;
use logcollector_status::StatusSink;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::MAX_LINE_LEN;
use crate::error::TailError;
use crate::sink::LineSink;

/// Read position bookkeeping. Only the tail loop mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TailCursor {
    /// File length when the tail was opened; nothing before it is read.
    pub start_offset: u64,
    /// Whether the first line after `start_offset` has been thrown away.
    pub first_line_discarded: bool,
    /// Lines forwarded since the last flush.
    pub pending_lines: u32,
    /// Bytes consumed from the file, including a buffered partial line.
    pub position: u64,
}

/// Totals for the lifetime of a tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TailStats {
    pub lines: u64,
    pub batches: u64,
    pub bytes: u64,
}

enum Step {
    Discarded,
    Forwarded,
    EndOfFile,
}

/// Follows a single log file.
pub struct TailReader {
    path: PathBuf,
    reader: BufReader<File>,
    cursor: TailCursor,
    partial: Vec<u8>,
    max_line_len: usize,
    poll_interval: Duration,
    status: StatusSink,
    stats: TailStats,
}

impl TailReader {
    /// Opens `path` and positions the reader at its current end.
    pub async fn open(
        path: impl AsRef<Path>,
        poll_interval: Duration,
        status: StatusSink,
    ) -> Result<Self, TailError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let start_offset = file.metadata().await?.len();

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start_offset)).await?;

        info!(path = %path.display(), start_offset, "tail opened");

        Ok(Self {
            path,
            reader,
            cursor: TailCursor {
                start_offset,
                position: start_offset,
                ..TailCursor::default()
            },
            partial: Vec::new(),
            max_line_len: MAX_LINE_LEN,
            poll_interval,
            status,
            stats: TailStats::default(),
        })
    }

    /// Sets the longest line accepted, terminator included.
    pub fn with_max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cursor(&self) -> TailCursor {
        self.cursor
    }

    pub fn stats(&self) -> TailStats {
        self.stats
    }

    /// Runs until `cancel` fires or an error occurs.
    ///
    /// The token is checked before every line and raced against every idle
    /// wait, so cancellation is observed after at most one line read.
    pub async fn run<S: LineSink>(
        &mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<TailStats, TailError> {
        self.status.enqueue("Collection started...").await;

        while !cancel.is_cancelled() {
            match self.step(sink).await? {
                Step::Discarded | Step::Forwarded => {}
                Step::EndOfFile => {
                    self.end_of_file(sink).await?;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        debug!(
            path = %self.path.display(),
            lines = self.stats.lines,
            batches = self.stats.batches,
            "tail stopped"
        );
        Ok(self.stats)
    }

    /// Reads everything available now, then performs the end-of-file
    /// bookkeeping. Returns the number of lines in the batch.
    pub async fn poll<S: LineSink>(&mut self, sink: &mut S) -> Result<u32, TailError> {
        while !matches!(self.step(sink).await?, Step::EndOfFile) {}
        self.end_of_file(sink).await
    }

    async fn step<S: LineSink>(&mut self, sink: &mut S) -> Result<Step, TailError> {
        let Some(line) = self.next_line().await? else {
            return Ok(Step::EndOfFile);
        };

        if !self.cursor.first_line_discarded {
            self.cursor.first_line_discarded = true;
            debug!(bytes = line.len(), "discarded first line after seek");
            return Ok(Step::Discarded);
        }

        let content = strip_line_terminator(&line);
        sink.write_line(content).await.map_err(TailError::Sink)?;
        self.cursor.pending_lines += 1;
        self.stats.lines += 1;
        self.stats.bytes += content.len() as u64;
        trace!(bytes = content.len(), "line forwarded");
        Ok(Step::Forwarded)
    }

    /// Flushes a non-empty batch and checks the file has not shrunk.
    async fn end_of_file<S: LineSink>(&mut self, sink: &mut S) -> Result<u32, TailError> {
        let batch = self.cursor.pending_lines;
        if batch > 0 {
            self.status.enqueue(format!("Collected {batch} lines")).await;
            self.cursor.pending_lines = 0;
            sink.flush().await.map_err(TailError::Sink)?;
            self.stats.batches += 1;
            debug!(lines = batch, "batch flushed");
        }

        let len = tokio::fs::metadata(&self.path).await?.len();
        if len < self.cursor.position {
            return Err(TailError::Truncated {
                path: self.path.clone(),
                position: self.cursor.position,
                len,
            });
        }
        Ok(batch)
    }

    /// Returns the next newline-terminated line, or `None` at end of file.
    ///
    /// A trailing fragment without a newline stays buffered and is completed
    /// by a later call once the rest of the line is appended.
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, TailError> {
        // One byte past the limit is enough to know the line is too long.
        let room = (self.max_line_len + 1).saturating_sub(self.partial.len());
        let n = (&mut self.reader)
            .take(room as u64)
            .read_until(b'\n', &mut self.partial)
            .await?;
        self.cursor.position += n as u64;
        if self.partial.len() > self.max_line_len {
            return Err(TailError::LineTooLong {
                path: self.path.clone(),
                limit: self.max_line_len,
            });
        }
        if self.partial.last() != Some(&b'\n') {
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.partial)))
    }
}
