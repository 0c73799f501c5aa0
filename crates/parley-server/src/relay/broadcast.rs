//! Peer list fan-out.

use tracing::{debug, warn};

use super::Relay;
use crate::protocol::Outbound;

impl Relay {
    /// Send the eligible peer set to every eligible peer.
    ///
    /// Returns whether there was anyone to send to; callers use this to
    /// decide whether a private reply is still owed.
    pub fn broadcast_peers(&self) -> bool {
        let eligible = self.registry.eligible(self.mode);
        if eligible.is_empty() {
            return false;
        }

        let message = Outbound::Peers {
            peers: eligible.iter().map(|c| c.peer_entry()).collect(),
            count: self.registry.open_count(self.mode),
        };
        let text = match message.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to serialize peer list");
                return false;
            }
        };

        debug!(recipients = eligible.len(), "broadcast peers");
        for client in &eligible {
            if !client.connection().send_text(text.clone()) {
                warn!(identity = %client.identity(), conn_id = %client.connection().id(), "failed to send peer list");
            }
        }
        true
    }
}
