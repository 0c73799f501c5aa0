//! Command dispatch for reconciled senders.

use std::sync::Arc;

use tracing::debug;

use super::Relay;
use crate::connection::ConnectionHandle;
use crate::protocol::{Command, Identity, Inbound, Outbound, PeerEntry};

impl Relay {
    pub(super) fn dispatch(
        &mut self,
        identity: &Identity,
        command: Command,
        inbound: Inbound,
        connection: &Arc<ConnectionHandle>,
    ) {
        match command {
            Command::Ping => self.ping(connection),
            Command::Nick => self.nick(identity, inbound.name, connection),
            Command::Reset => {}
            Command::Start if self.mode.is_pairing() => {
                if let Some(partner) = inbound.with {
                    self.start_session(identity, &partner);
                }
            }
            Command::Go if self.mode.is_pairing() => {
                if let (Some(col), Some(row)) = (inbound.col, inbound.row) {
                    self.relay_move(identity, col, row);
                }
            }
            other => debug!(%identity, command = other.as_str(), "ignoring unrecognized command"),
        }
    }

    fn ping(&self, connection: &ConnectionHandle) {
        if !self.broadcast_peers() {
            let count = self.registry.open_count(self.mode);
            let _ = connection.send(&Outbound::pong_count(count));
        }
    }

    fn nick(&mut self, identity: &Identity, name: Option<String>, connection: &ConnectionHandle) {
        if let Some(name) = name {
            let _ = self.registry.set_name(identity, name);
        }
        if self.sweep() || self.broadcast_peers() {
            return;
        }
        let name = self
            .registry
            .get(identity)
            .map(|c| c.display_name().to_owned())
            .unwrap_or_default();
        let ack = Outbound::Nick {
            peers: PeerEntry {
                name,
                index: identity.clone(),
            },
        };
        let _ = connection.send(&ack);
    }
}

#[cfg(test)]
mod tests {
    use parley_settings::RelayMode;
    use serde_json::json;

    use super::super::testing::{FakeSocket, named};
    use super::*;

    #[test]
    fn ping_alone_gets_pong_with_open_count() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = FakeSocket::open();
        let mut b = FakeSocket::open();
        b.say(&mut relay, "b", "reset", json!({}));
        a.say(&mut relay, "a", "ping", json!({}));

        assert_eq!(a.drain(), vec![json!({"do": "pong", "count": 2})]);
        assert!(b.drain().is_empty());
    }

    #[test]
    fn repeated_ping_without_peers_yields_one_pong_each() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = FakeSocket::open();
        a.say(&mut relay, "a", "ping", json!({}));
        assert_eq!(a.drain(), vec![json!({"do": "pong", "count": 1})]);
        a.say(&mut relay, "a", "ping", json!({}));
        assert_eq!(a.drain(), vec![json!({"do": "pong", "count": 1})]);
    }

    #[test]
    fn ping_with_eligible_peers_broadcasts_instead() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = named(&mut relay, "a", "ann");
        let mut b = FakeSocket::open();
        b.say(&mut relay, "b", "ping", json!({}));

        // b is unnamed so it is not a recipient, and no pong is owed.
        assert!(b.drain().is_empty());
        assert_eq!(a.drain_kind("peers").len(), 1);
    }

    #[test]
    fn pairing_mode_pong_excludes_paired_clients() {
        let mut relay = Relay::new(RelayMode::Pairing);
        let a = named(&mut relay, "a", "ann");
        let _b = named(&mut relay, "b", "bob");
        a.say(&mut relay, "a", "start", json!({"with": "b"}));

        let mut c = FakeSocket::open();
        c.say(&mut relay, "c", "ping", json!({}));
        assert_eq!(c.drain(), vec![json!({"do": "pong", "count": 1})]);
    }

    #[test]
    fn nick_makes_identity_visible_exactly_once() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = named(&mut relay, "a", "ann");
        let mut x = FakeSocket::open();
        x.say(&mut relay, "x", "reset", json!({}));
        x.say(&mut relay, "x", "nick", json!({"name": "xena"}));
        let _ = (a.drain(), x.drain());

        a.say(&mut relay, "a", "ping", json!({}));
        let peers = a.drain_kind("peers");
        assert_eq!(peers.len(), 1);
        let listed: Vec<_> = peers[0]["peers"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|p| p["index"] == "x")
            .collect();
        assert_eq!(listed, vec![&json!({"name": "xena", "index": "x"})]);
    }

    #[test]
    fn first_nick_broadcasts_to_self() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = FakeSocket::open();
        a.say(&mut relay, "a", "reset", json!({}));
        a.say(&mut relay, "a", "nick", json!({"name": "ann"}));
        assert_eq!(
            a.drain(),
            vec![json!({"do": "peers", "peers": [{"name": "ann", "index": "a"}], "count": 1})]
        );
    }

    #[test]
    fn nick_with_empty_name_gets_private_ack() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = FakeSocket::open();
        a.say(&mut relay, "a", "reset", json!({}));
        a.say(&mut relay, "a", "nick", json!({"name": ""}));
        assert_eq!(
            a.drain(),
            vec![json!({"do": "nick", "peers": {"name": "", "index": "a"}})]
        );
    }

    #[test]
    fn nick_without_name_keeps_previous_name() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let a = named(&mut relay, "a", "ann");
        a.say(&mut relay, "a", "nick", json!({}));
        assert_eq!(relay.registry().get(&"a".into()).unwrap().display_name(), "ann");
    }

    #[test]
    fn nick_after_sweep_broadcast_does_not_broadcast_twice() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = named(&mut relay, "a", "ann");
        let mut b = named(&mut relay, "b", "bob");
        let _ = a.drain();
        b.disconnect();

        a.say(&mut relay, "a", "nick", json!({"name": "anna"}));
        let peers = a.drain_kind("peers");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0]["peers"], json!([{"name": "anna", "index": "a"}]));
    }

    #[test]
    fn reset_from_known_identity_is_a_noop() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = named(&mut relay, "a", "ann");
        let mut b = named(&mut relay, "b", "bob");
        let _ = a.drain();
        b.say(&mut relay, "b", "reset", json!({"room": "r"}));
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
    }

    #[test]
    fn pairing_commands_ignored_in_signaling_mode() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = named(&mut relay, "a", "ann");
        let mut b = named(&mut relay, "b", "bob");
        let _ = a.drain();
        a.say(&mut relay, "a", "start", json!({"with": "b"}));
        a.say(&mut relay, "a", "go", json!({"col": 1, "row": 2}));
        assert!(relay.registry().get(&"a".into()).unwrap().paired_with().is_none());
        assert!(b.drain().is_empty());
    }

    #[test]
    fn unrecognized_command_from_known_identity_is_a_noop() {
        let mut relay = Relay::new(RelayMode::Signaling);
        let mut a = named(&mut relay, "a", "ann");
        a.say(&mut relay, "a", "dance", json!({}));
        assert!(a.drain().is_empty());
    }
}
