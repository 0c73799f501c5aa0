//! The relay state machine.
//!
//! Every inbound message goes through [`Relay::handle`]: reconciliation
//! binds the claimed identity to the connection it arrived on, then the
//! dispatcher runs the command. All methods take `&mut self`, so the owner
//! (the hub task) serializes them.

mod broadcast;
mod dispatch;
mod pairing;
mod reconcile;

use std::sync::Arc;

use parley_settings::RelayMode;
use tracing::{debug, info, instrument};

use crate::connection::ConnectionHandle;
use crate::protocol::{self, Inbound};
use crate::registry::ClientRegistry;

pub use reconcile::Reconciliation;

/// Point-in-time registry figures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Registry entries, open or not.
    pub clients: usize,
    /// Entries with an open connection.
    pub open: usize,
    /// Entries currently paired.
    pub paired: usize,
}

/// Registry plus the rules that mutate it.
#[derive(Debug)]
pub struct Relay {
    registry: ClientRegistry,
    mode: RelayMode,
}

impl Relay {
    /// Empty relay in the given mode.
    pub fn new(mode: RelayMode) -> Self {
        Self {
            registry: ClientRegistry::new(),
            mode,
        }
    }

    /// Operating mode.
    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    /// Read access to the registry.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Decode and handle one text frame. Malformed frames are dropped.
    pub fn handle_text(&mut self, connection: &Arc<ConnectionHandle>, text: &str) {
        match protocol::decode(text) {
            Ok(inbound) => self.handle(connection, inbound),
            Err(e) => {
                debug!(conn_id = %connection.id(), error = %e, "dropping malformed message");
            }
        }
    }

    /// Reconcile the sender, then dispatch its command.
    #[instrument(skip_all, fields(conn_id = %connection.id(), command))]
    pub fn handle(&mut self, connection: &Arc<ConnectionHandle>, inbound: Inbound) {
        let identity = match inbound.identity() {
            Ok(identity) => identity.clone(),
            Err(e) => {
                debug!(error = %e, "dropping message");
                return;
            }
        };
        let command = inbound.command();
        let _ = tracing::Span::current().record("command", command.as_str());

        // Frames queued before their socket was replaced or closed.
        if !connection.is_open() {
            debug!(%identity, "dropping frame from non-open connection");
            return;
        }

        let outcome = self.reconcile(&identity, &command, &inbound, connection);
        if outcome.proceeds() {
            self.dispatch(&identity, command, inbound, connection);
        }
    }

    /// Janitor tick: evict dead entries and re-broadcast if any went.
    ///
    /// Returns whether a peer broadcast was sent.
    pub fn sweep(&mut self) -> bool {
        let removed = self.registry.sweep();
        if removed.is_empty() {
            return false;
        }
        info!(removed = removed.len(), remaining = self.registry.len(), "swept dead clients");
        self.broadcast_peers()
    }

    /// Current registry figures.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            clients: self.registry.len(),
            open: self.registry.iter().filter(|c| c.is_open()).count(),
            paired: self
                .registry
                .iter()
                .filter(|c| c.paired_with().is_some())
                .count(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake clients for driving a [`Relay`] without sockets.

    use std::sync::Arc;

    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::Relay;
    use crate::connection::ConnectionHandle;

    /// One fake socket: the handle the relay sees plus its outbound queue.
    pub struct FakeSocket {
        pub conn: Arc<ConnectionHandle>,
        rx: Option<mpsc::Receiver<Arc<str>>>,
    }

    impl FakeSocket {
        pub fn open() -> Self {
            let (conn, rx) = ConnectionHandle::channel(64);
            Self { conn, rx: Some(rx) }
        }

        /// Simulate the peer going away.
        pub fn disconnect(&mut self) {
            self.rx = None;
        }

        /// Every message queued so far, decoded.
        pub fn drain(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            if let Some(rx) = self.rx.as_mut() {
                while let Ok(text) = rx.try_recv() {
                    out.push(serde_json::from_str(&text).unwrap());
                }
            }
            out
        }

        /// Drained messages with the given `do`.
        pub fn drain_kind(&mut self, kind: &str) -> Vec<Value> {
            self.drain()
                .into_iter()
                .filter(|m| m["do"] == kind)
                .collect()
        }

        /// Send `{index, do, ...extra}` through the relay on this socket.
        pub fn say(&self, relay: &mut Relay, index: &str, action: &str, extra: Value) {
            let mut msg = json!({"index": index, "do": action});
            if let (Some(obj), Some(more)) = (msg.as_object_mut(), extra.as_object()) {
                for (k, v) in more {
                    let _ = obj.insert(k.clone(), v.clone());
                }
            }
            relay.handle_text(&self.conn, &msg.to_string());
        }
    }

    /// Register `index` with `ping` and name it with `nick`, then clear its
    /// queue.
    pub fn named(relay: &mut Relay, index: &str, name: &str) -> FakeSocket {
        let mut socket = FakeSocket::open();
        socket.say(relay, index, "ping", json!({}));
        socket.say(relay, index, "nick", json!({"name": name}));
        let _ = socket.drain();
        socket
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::{FakeSocket, named};
    use super::*;
    use crate::protocol::Identity;

    #[test]
    fn malformed_text_is_ignored() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut socket = FakeSocket::open();
        relay.handle_text(&socket.conn, "{not json");
        relay.handle_text(&socket.conn, "[1,2]");
        assert!(relay.registry().is_empty());
        assert!(socket.drain().is_empty());
    }

    #[test]
    fn message_without_identity_never_mutates_registry() {
        let mut relay = Relay::new(RelayMode::Pairing);
        let mut socket = FakeSocket::open();
        for action in ["ping", "nick", "reset", "start", "go"] {
            relay.handle_text(&socket.conn, &json!({"do": action, "name": "x"}).to_string());
        }
        assert!(relay.registry().is_empty());
        assert!(socket.drain().is_empty());
    }

    #[test]
    fn never_two_entries_for_one_identity() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let sockets: Vec<FakeSocket> = (0..4).map(|_| FakeSocket::open()).collect();
        for socket in &sockets {
            socket.say(&mut relay, "x", "ping", json!({}));
            socket.say(&mut relay, "x", "nick", json!({"name": "xena"}));
        }
        assert_eq!(relay.registry().len(), 1);
        let open_for_x = relay
            .registry()
            .iter()
            .filter(|c| c.identity() == &Identity::from("x") && c.is_open())
            .count();
        assert_eq!(open_for_x, 1);
        let last = sockets.last().unwrap();
        assert_eq!(
            relay.registry().get(&"x".into()).unwrap().connection().id(),
            last.conn.id()
        );
    }

    #[test]
    fn stale_frame_from_replaced_socket_is_ignored() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let first = named(&mut relay, "x", "xena");
        let mut second = FakeSocket::open();
        second.say(&mut relay, "x", "ping", json!({}));
        assert!(!first.conn.is_open());
        let _ = second.drain();

        first.say(&mut relay, "x", "ping", json!({}));

        assert!(second.conn.is_open());
        let client = relay.registry().get(&"x".into()).unwrap();
        assert_eq!(client.connection().id(), second.conn.id());
        assert!(second.drain().is_empty());
    }

    #[test]
    fn frames_from_closed_socket_never_register() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut gone = FakeSocket::open();
        gone.disconnect();
        gone.say(&mut relay, "g", "reset", json!({}));
        assert!(relay.registry().is_empty());
    }

    #[test]
    fn sweep_evicts_and_rebroadcasts() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = named(&mut relay, "a", "ann");
        let mut b = named(&mut relay, "b", "bob");
        let _ = a.drain();

        b.disconnect();
        assert!(relay.sweep());
        assert!(relay.registry().get(&"b".into()).is_none());

        let peers = a.drain_kind("peers");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0]["peers"], json!([{"name": "ann", "index": "a"}]));
        assert_eq!(peers[0]["count"], 1);
    }

    #[test]
    fn sweep_without_dead_entries_is_silent() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = named(&mut relay, "a", "ann");
        assert!(!relay.sweep());
        assert!(a.drain().is_empty());
    }

    #[test]
    fn stats_count_entries() {
        let mut relay = Relay::new(RelayMode::Pairing);
        let a = named(&mut relay, "a", "ann");
        let _b = named(&mut relay, "b", "bob");
        let mut c = named(&mut relay, "c", "cid");
        c.disconnect();
        a.say(&mut relay, "a", "start", json!({"with": "b"}));

        let stats = relay.stats();
        assert_eq!(stats.clients, 3);
        assert_eq!(stats.open, 2);
        assert_eq!(stats.paired, 2);
    }
}
