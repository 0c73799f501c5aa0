//! Identity-to-connection reconciliation, run before every command.

use std::sync::Arc;

use tracing::{debug, info};

use super::Relay;
use crate::connection::ConnectionHandle;
use crate::protocol::{Command, Identity, Inbound, Outbound};

/// What reconciliation decided about an inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// Unknown identity with a bootstrap command: new record created.
    Registered,
    /// Unknown identity with any other command: message discarded.
    Rejected,
    /// Stored connection was no longer open: new one adopted silently.
    Reconnected,
    /// Stored connection still open: old one closed, new one told to reset.
    Replaced,
    /// Message arrived on the stored connection.
    Current,
}

impl Reconciliation {
    /// Whether the command should be dispatched.
    pub fn proceeds(self) -> bool {
        self != Self::Rejected
    }
}

impl Relay {
    /// Commands that may create a record for an unknown identity.
    fn registers(&self, command: &Command) -> bool {
        match command {
            Command::Reset | Command::Ping => true,
            Command::Nick => self.mode.is_pairing(),
            _ => false,
        }
    }

    pub(super) fn reconcile(
        &mut self,
        identity: &Identity,
        command: &Command,
        inbound: &Inbound,
        connection: &Arc<ConnectionHandle>,
    ) -> Reconciliation {
        let Some(client) = self.registry.get(identity) else {
            return self.first_contact(identity, command, inbound, connection);
        };
        let stored = client.connection().clone();

        if !stored.is_open() {
            let _ = self.registry.adopt_connection(identity, connection.clone());
            debug!(%identity, old = %stored.id(), "reconnected");
            return Reconciliation::Reconnected;
        }

        if stored.id() != connection.id() {
            stored.close();
            let _ = self.registry.adopt_connection(identity, connection.clone());
            let _ = self.sweep();
            let _ = connection.send(&Outbound::Reset);
            info!(%identity, old = %stored.id(), "duplicate session, closed older connection");
            return Reconciliation::Replaced;
        }

        Reconciliation::Current
    }

    fn first_contact(
        &mut self,
        identity: &Identity,
        command: &Command,
        inbound: &Inbound,
        connection: &Arc<ConnectionHandle>,
    ) -> Reconciliation {
        if !self.registers(command) {
            if !self.sweep() {
                let _ = self.broadcast_peers();
            }
            debug!(%identity, "unknown identity, discarding");
            return Reconciliation::Rejected;
        }

        self.registry.insert(identity.clone(), connection.clone());
        debug!(%identity, "registered");

        if *command == Command::Reset && inbound.has_room() {
            if let Some(peer) = self.registry.find_open_other(identity) {
                let hint = Outbound::rendezvous(peer.identity().clone(), identity.clone());
                let _ = peer.connection().send(&hint);
                debug!(%identity, to = %peer.identity(), "sent rendezvous hint");
            }
        }
        Reconciliation::Registered
    }
}
