//! Two-party sessions: `start` pairs two identities, `go` relays moves
//! between them and nobody else.

use serde_json::Value;
use tracing::{debug, info};

use super::Relay;
use crate::protocol::{Identity, Outbound};

impl Relay {
    /// Pair `initiator` with `partner` and tell the partner.
    ///
    /// An unknown partner, or the initiator naming itself, is a silent
    /// no-op. The remaining lobby gets a fresh peer list since two peers
    /// just left discovery.
    pub(super) fn start_session(&mut self, initiator: &Identity, partner: &Identity) {
        if let Err(e) = self.registry.establish_pairing(initiator, partner) {
            debug!(%initiator, %partner, error = %e, "pairing refused");
            return;
        }
        info!(%initiator, %partner, "session started");

        if let Some(client) = self.registry.get(partner) {
            let _ = client.connection().send(&Outbound::Start {
                index: partner.clone(),
                to: initiator.clone(),
            });
        }
        let _ = self.broadcast_peers();
    }

    /// Forward a move to the sender's partner only.
    pub(super) fn relay_move(&self, sender: &Identity, col: Value, row: Value) {
        match self.registry.partner_of(sender) {
            Ok(partner) => {
                let _ = partner.connection().send(&Outbound::Go { col, row });
            }
            Err(e) => debug!(%sender, error = %e, "dropping move"),
        }
    }
}
