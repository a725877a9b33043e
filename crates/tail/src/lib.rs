//! Log file tailer.
//!
//! Follows a growing text file from the moment it is opened: existing
//! content is skipped, appended lines are forwarded to a [`LineSink`] in
//! batches, and each batch is flushed when the reader catches up with the
//! end of the file. Between batches the reader sleeps for a fixed poll
//! interval instead of relying on file-change notifications.

mod error;
mod filter;
mod sink;
mod tailer;

pub use error::TailError;
pub use filter::LogFilter;
pub use sink::LineSink;
pub use tailer::{TailCursor, TailReader, TailStats};

use std::time::Duration;

/// Delay between end-of-file checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Longest line the tailer buffers, terminator included (1 MiB).
pub const MAX_LINE_LEN: usize = 1024 * 1024;
