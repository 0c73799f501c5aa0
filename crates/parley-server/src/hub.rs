//! Single consumer task that owns the [`Relay`].
//!
//! Sessions and the janitor never touch relay state directly; they post
//! [`HubEvent`]s and the hub applies them one at a time.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::ConnectionHandle;
use crate::relay::{Relay, RelayStats};

/// Default hub inbox depth.
pub const DEFAULT_HUB_CAPACITY: usize = 1024;

/// Work item for the hub.
#[derive(Debug)]
pub enum HubEvent {
    /// A text frame received on `connection`.
    Message {
        /// Connection the frame arrived on.
        connection: Arc<ConnectionHandle>,
        /// Raw frame payload.
        text: String,
    },
    /// Janitor tick.
    Sweep,
    /// Snapshot request for `/health`.
    Stats(oneshot::Sender<RelayStats>),
}

/// Spawn the hub. It stops when `cancel` fires or every sender is gone.
pub fn spawn_hub(
    relay: Relay,
    capacity: usize,
    cancel: CancellationToken,
) -> (mpsc::Sender<HubEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run_hub(relay, rx, cancel));
    (tx, handle)
}

async fn run_hub(mut relay: Relay, mut rx: mpsc::Receiver<HubEvent>, cancel: CancellationToken) {
    info!(mode = %relay.mode(), "hub started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => apply(&mut relay, event),
                None => break,
            },
        }
    }
    debug!(clients = relay.registry().len(), "hub stopped");
}

fn apply(relay: &mut Relay, event: HubEvent) {
    match event {
        HubEvent::Message { connection, text } => relay.handle_text(&connection, &text),
        HubEvent::Sweep => {
            let _ = relay.sweep();
        }
        HubEvent::Stats(reply) => {
            let _ = reply.send(relay.stats());
        }
    }
}
