//! Live WebSocket connection as seen by the relay.
//!
//! The relay never touches the socket. It holds a [`ConnectionHandle`] that
//! queues text onto the socket's writer task and can ask that task to close.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::protocol::Outbound;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    /// Frames are being delivered.
    Open,
    /// Close requested, writer not yet gone.
    Closing,
    /// Writer task has exited.
    Closed,
}

/// Sending half of one client socket.
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    close: CancellationToken,
    dropped_messages: AtomicU64,
}

impl ConnectionHandle {
    /// Wrap the sender feeding a socket writer task.
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: ConnectionId::next(),
            tx,
            close: CancellationToken::new(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a handle plus the receiver its writer task should drain.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::new(tx)), rx)
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> ReadyState {
        if self.tx.is_closed() {
            ReadyState::Closed
        } else if self.close.is_cancelled() {
            ReadyState::Closing
        } else {
            ReadyState::Open
        }
    }

    /// Whether the connection is in the open state.
    pub fn is_open(&self) -> bool {
        self.state() == ReadyState::Open
    }

    /// Queue a text frame without waiting.
    ///
    /// Returns `false` if the queue is full or the writer is gone, and
    /// increments the dropped message counter.
    pub fn send_text(&self, text: Arc<str>) -> bool {
        if self.tx.try_send(text).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and queue a message.
    pub fn send(&self, message: &Outbound) -> bool {
        match message.to_text() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!(conn_id = %self.id, kind = message.kind(), error = %e, "failed to serialize message");
                false
            }
        }
    }

    /// Ask the writer task to send a Close frame and stop.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn close_requested(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
