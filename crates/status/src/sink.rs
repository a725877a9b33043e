//! Bounded status queue with an explicit overflow policy.
//!
//! # Overflow
//!
//! - [`OverflowPolicy::Block`]: a full queue suspends the producer until the
//!   consumer drains an entry. Nothing is ever lost, at the cost of stalling
//!   the producing task while the display is behind.
//! - [`OverflowPolicy::DropOldest`]: producers never wait. When the queue is
//!   full the oldest undelivered entry is evicted, so the most recent
//!   diagnostic always survives. The queue never holds more than `capacity`
//!   entries. The consumer learns how many were evicted through
//!   [`StatusDrain::dropped`].

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, mpsc};
use tracing::{debug, trace};

use crate::message::StatusMessage;

/// What a producer does when the status queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for the consumer to make room.
    #[default]
    Block,
    /// Evict the oldest queued entry.
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Block => write!(f, "block"),
            OverflowPolicy::DropOldest => write!(f, "drop-oldest"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop-oldest" | "drop_oldest" | "dropoldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}

/// Creates a status queue holding at most `capacity` pending messages.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn channel(capacity: usize, policy: OverflowPolicy) -> (StatusSink, StatusDrain) {
    assert!(capacity > 0, "status queue capacity must be > 0");
    match policy {
        OverflowPolicy::Block => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                StatusSink {
                    tx: Sender::Block(tx),
                },
                StatusDrain {
                    rx: Receiver::Block(rx),
                },
            )
        }
        OverflowPolicy::DropOldest => {
            let ring = Arc::new(Ring {
                state: Mutex::new(RingState {
                    queue: VecDeque::with_capacity(capacity),
                    dropped: 0,
                    senders: 1,
                    receiver_alive: true,
                }),
                notify: Notify::new(),
                capacity,
            });
            (
                StatusSink {
                    tx: Sender::DropOldest(RingSender { ring: ring.clone() }),
                },
                StatusDrain {
                    rx: Receiver::DropOldest(RingReceiver { ring }),
                },
            )
        }
    }
}

/// Fixed-size queue that evicts from the front when full.
struct Ring {
    state: Mutex<RingState>,
    notify: Notify,
    capacity: usize,
}

struct RingState {
    queue: VecDeque<StatusMessage>,
    dropped: u64,
    senders: usize,
    receiver_alive: bool,
}

impl Ring {
    /// Every critical section leaves the state valid, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct RingSender {
    ring: Arc<Ring>,
}

impl RingSender {
    /// Returns false when the receiver is gone.
    fn send(&self, msg: StatusMessage) -> bool {
        let mut state = self.ring.lock();
        if !state.receiver_alive {
            return false;
        }
        if state.queue.len() == self.ring.capacity {
            state.queue.pop_front();
            state.dropped += 1;
            trace!(dropped = state.dropped, "status queue full, oldest entry evicted");
        }
        state.queue.push_back(msg);
        drop(state);
        self.ring.notify.notify_one();
        true
    }
}

impl Clone for RingSender {
    fn clone(&self) -> Self {
        self.ring.lock().senders += 1;
        Self {
            ring: self.ring.clone(),
        }
    }
}

impl Drop for RingSender {
    fn drop(&mut self) {
        let mut state = self.ring.lock();
        state.senders -= 1;
        if state.senders == 0 {
            drop(state);
            self.ring.notify.notify_one();
        }
    }
}

struct RingReceiver {
    ring: Arc<Ring>,
}

impl RingReceiver {
    /// `Ok(None)` means empty but still open; `Err(())` means closed.
    fn try_recv(&self) -> Result<Option<StatusMessage>, ()> {
        let mut state = self.ring.lock();
        match state.queue.pop_front() {
            Some(msg) => Ok(Some(msg)),
            None if state.senders == 0 => Err(()),
            None => Ok(None),
        }
    }

    async fn recv(&self) -> Option<StatusMessage> {
        loop {
            match self.try_recv() {
                Ok(Some(msg)) => return Some(msg),
                Err(()) => return None,
                // notify_one stores a permit, so a push between the check
                // and this await is not missed.
                Ok(None) => self.ring.notify.notified().await,
            }
        }
    }

    fn dropped(&self) -> u64 {
        self.ring.lock().dropped
    }
}

impl Drop for RingReceiver {
    fn drop(&mut self) {
        let mut state = self.ring.lock();
        state.receiver_alive = false;
        state.queue.clear();
    }
}

#[derive(Clone)]
enum Sender {
    Block(mpsc::Sender<StatusMessage>),
    DropOldest(RingSender),
}

enum Receiver {
    Block(mpsc::Receiver<StatusMessage>),
    DropOldest(RingReceiver),
}

/// Producer half. Cheap to clone; one clone per task.
#[derive(Clone)]
pub struct StatusSink {
    tx: Sender,
}

impl StatusSink {
    /// Stamps `text` with the current time and queues it.
    pub async fn enqueue(&self, text: impl Into<String>) {
        self.push(StatusMessage::new(text)).await;
    }

    /// Queues an already-built message.
    ///
    /// Under [`OverflowPolicy::Block`] this waits while the queue is full.
    /// If the consumer is gone the message is discarded.
    pub async fn push(&self, msg: StatusMessage) {
        debug!(target: "logcollector::status", "{}", msg.text());
        let delivered = match &self.tx {
            Sender::Block(tx) => tx.send(msg).await.is_ok(),
            Sender::DropOldest(tx) => tx.send(msg),
        };
        if !delivered {
            trace!("status drain closed, message discarded");
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        match self.tx {
            Sender::Block(_) => OverflowPolicy::Block,
            Sender::DropOldest(_) => OverflowPolicy::DropOldest,
        }
    }
}

/// Consumer half. There is exactly one per queue.
pub struct StatusDrain {
    rx: Receiver,
}

impl StatusDrain {
    /// Waits for the next message in FIFO order.
    ///
    /// Returns `None` once every [`StatusSink`] has been dropped and the
    /// queue is empty.
    pub async fn drain(&mut self) -> Option<StatusMessage> {
        match &mut self.rx {
            Receiver::Block(rx) => rx.recv().await,
            Receiver::DropOldest(rx) => rx.recv().await,
        }
    }

    /// Returns the next queued message without waiting.
    pub fn try_drain(&mut self) -> Option<StatusMessage> {
        match &mut self.rx {
            Receiver::Block(rx) => rx.try_recv().ok(),
            Receiver::DropOldest(rx) => rx.try_recv().ok().flatten(),
        }
    }

    /// Total entries evicted by [`OverflowPolicy::DropOldest`] so far.
    pub fn dropped(&self) -> u64 {
        match &self.rx {
            Receiver::Block(_) => 0,
            Receiver::DropOldest(rx) => rx.dropped(),
        }
    }
}
