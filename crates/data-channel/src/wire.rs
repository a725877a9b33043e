//! Collector wire format.
//!
//! # Wire format
//!
//! ```text
//! HANDSHAKE (Collector -> Server):  [uploader name, raw UTF-8, no terminator]
//! REPLY (Server -> Collector):      "OK\n" to accept, any other line rejects
//!
//! AFTER ACCEPT:
//!   Server -> Collector:  zero or more "<status text>\n" lines, any time
//!   Collector -> Server:  one zlib stream (level 9), sync-flushed per batch;
//!                         decompresses to "<log line>\r\n" records
//! ```
//!
//! The name has no delimiter, so the server takes whatever the first read
//! returns. The collector writes it with a single `write_all` + flush.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DataChannelError;
use crate::{MAX_SERVER_LINE_LEN, MAX_UPLOADER_NAME_LEN};

/// Reply line that accepts the handshake.
pub const HANDSHAKE_OK: &str = "OK";

/// Rejection reason reported when the server closes before replying.
pub const CLOSED_REPLY: &str = "null";

/// Prefix for server-originated lines in the status transcript.
pub const SERVER_MESSAGE_PREFIX: &str = "[S] ";

/// Terminator appended to every uploaded log line.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Writes the uploader name and flushes.
pub async fn write_uploader_name<W: AsyncWrite + Unpin>(
    writer: &mut W,
    name: &str,
) -> Result<(), DataChannelError> {
    if name.is_empty() {
        return Err(DataChannelError::InvalidUploaderName);
    }
    writer.write_all(name.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the uploader name with a single read (server side).
pub async fn read_uploader_name<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<String, DataChannelError> {
    let mut buf = [0u8; MAX_UPLOADER_NAME_LEN];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Err(DataChannelError::Protocol(
            "connection closed before uploader name".into(),
        ));
    }
    String::from_utf8(buf[..n].to_vec())
        .map_err(|e| DataChannelError::Protocol(format!("invalid UTF-8 uploader name: {e}")))
}

/// Reads one newline-terminated text line, without its terminator.
///
/// Returns `None` at end of stream. A final line without a newline is
/// still returned. Invalid UTF-8 is replaced with U+FFFD, not rejected.
pub async fn read_text_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, DataChannelError> {
    let mut raw = Vec::new();
    let n = (&mut *reader)
        .take(MAX_SERVER_LINE_LEN as u64)
        .read_until(b'\n', &mut raw)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if n >= MAX_SERVER_LINE_LEN && raw.last() != Some(&b'\n') {
        return Err(DataChannelError::Protocol(format!(
            "line exceeds {MAX_SERVER_LINE_LEN} bytes"
        )));
    }
    let mut line = String::from_utf8_lossy(&raw).into_owned();
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// Writes one text line followed by `\n` and flushes.
pub async fn write_text_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    line: &str,
) -> Result<(), DataChannelError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Strips one trailing `\n` or `\r\n` from a raw line.
pub fn strip_line_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
