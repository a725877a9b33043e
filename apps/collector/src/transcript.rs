//! Transcript renderer: the status queue's single consumer.

use logcollector_status::StatusDrain;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Writes every status line to `out` until the queue closes.
///
/// Each line is flushed as soon as it is written so the newest entry is
/// always on screen. Returns the number of lines written.
pub async fn render<W: AsyncWrite + Unpin>(
    mut drain: StatusDrain,
    mut out: W,
) -> std::io::Result<u64> {
    let mut written = 0;
    let mut reported_drops = 0;
    while let Some(msg) = drain.drain().await {
        if drain.dropped() > reported_drops {
            let missed = drain.dropped() - reported_drops;
            reported_drops = drain.dropped();
            warn!(missed, "status lines dropped before display");
            let note = format!("... {missed} status lines dropped ...\n");
            out.write_all(note.as_bytes()).await?;
        }
        out.write_all(msg.formatted().as_bytes()).await?;
        out.flush().await?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use logcollector_status::OverflowPolicy;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn renders_in_order_until_closed() {
        let (sink, drain) = logcollector_status::channel(8, OverflowPolicy::Block);
        sink.enqueue("Connecting to 127.0.0.1:8124...").await;
        sink.enqueue("[S] welcome").await;
        drop(sink);

        let mut out = Vec::new();
        let written = render(drain, &mut out).await.unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] Connecting to 127.0.0.1:8124..."));
        assert!(lines[1].ends_with("] [S] welcome"));
    }

    #[tokio::test]
    async fn each_line_reaches_the_writer_before_the_next_arrives() {
        let (sink, drain) = logcollector_status::channel(8, OverflowPolicy::Block);
        let (writer, mut reader) = tokio::io::duplex(256);
        let task = tokio::spawn(render(drain, writer));

        sink.enqueue("Ready to collect!").await;
        let mut buf = vec![0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(1), reader.read(&mut buf))
            .await
            .expect("line should be flushed immediately")
            .unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).ends_with("] Ready to collect!\n"));

        drop(sink);
        assert_eq!(task.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn notes_evicted_lines() {
        let (sink, drain) = logcollector_status::channel(2, OverflowPolicy::DropOldest);
        for i in 0..5 {
            sink.enqueue(format!("msg {i}")).await;
        }
        drop(sink);

        let mut out = Vec::new();
        let written = render(drain, &mut out).await.unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "... 3 status lines dropped ...");
        assert!(lines[1].ends_with("] msg 3"));
        assert!(lines[2].ends_with("] msg 4"));
    }
}
