//! Bounded per-peer outbound queues.
//!
//! Messages for a neighbour are never queued without limit: when its queue is
//! full the message is dropped on the spot and counted.

use tokio::sync::mpsc;
use vertex_dht_wire::DhtMessage;

/// Why a message could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("outbound queue full")]
    Full,
    #[error("peer connection closed")]
    Closed,
}

/// Sending half of a neighbour's outbound queue.
///
/// The receiving half belongs to the transport writing frames to the peer.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<DhtMessage>,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` messages.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<DhtMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue `message` unless the queue is full or the peer is gone.
    pub fn try_enqueue(&self, message: DhtMessage) -> Result<(), EnqueueError> {
        self.tx.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Messages waiting to be written.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
