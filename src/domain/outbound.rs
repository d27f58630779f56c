//! Per-connection outbound queue handle.
//!
//! The transport drains the receiving half into the socket; the relay only
//! ever pushes into the bounded sender without waiting, so a stalled
//! consumer loses messages instead of holding up everyone else.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// Serialized JSON text queued for one connection.
pub type Payload = Arc<str>;

/// Sending half of a connection's bounded outbound queue.
///
/// Cloning is cheap and clones share the drop counter.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Payload>,
    dropped: Arc<AtomicU64>,
}

impl Outbound {
    /// Creates a queue with room for `capacity` pending payloads.
    ///
    /// A zero capacity is bumped to one, since `mpsc` rejects it.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Queues `payload` without blocking.
    ///
    /// Returns `false` and bumps the drop counter when the queue is full or
    /// the receiving side is gone.
    pub fn send(&self, payload: Payload) -> bool {
        if self.tx.try_send(payload).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total payloads dropped for this connection.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
