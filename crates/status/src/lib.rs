//! Operator-facing status transcript.
//!
//! Every task of a collection session reports progress and failures as
//! short text lines. Producers push them into a bounded queue through a
//! cloneable [`StatusSink`]; a single consumer drains them in FIFO order
//! through [`StatusDrain`] and renders them. The queue knows nothing about
//! how the lines are displayed.

mod message;
mod sink;

pub use message::{StatusMessage, TIMESTAMP_FORMAT};
pub use sink::{OverflowPolicy, StatusDrain, StatusSink, channel};

/// Default queue capacity (matches the transcript window's backlog).
pub const STATUS_QUEUE_CAPACITY: usize = 100;
