//! Identity → client mapping. The single source of truth for who is
//! connected.
//!
//! At most one [`Client`] exists per identity, and it always references the
//! most recently accepted connection for that identity.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parley_settings::RelayMode;

use crate::connection::ConnectionHandle;
use crate::error::RelayError;
use crate::protocol::{Identity, PeerEntry};

/// One known identity.
#[derive(Debug)]
pub struct Client {
    identity: Identity,
    display_name: String,
    connection: Arc<ConnectionHandle>,
    paired_with: Option<Identity>,
}

impl Client {
    fn new(identity: Identity, connection: Arc<ConnectionHandle>) -> Self {
        Self {
            identity,
            display_name: String::new(),
            connection,
            paired_with: None,
        }
    }

    /// Identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Display name; empty until `nick`.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Current connection.
    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        &self.connection
    }

    /// Partner identity in pairing mode.
    pub fn paired_with(&self) -> Option<&Identity> {
        self.paired_with.as_ref()
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Counted in `count` fields: open, and unpaired in pairing mode.
    pub fn is_counted(&self, mode: RelayMode) -> bool {
        self.is_open() && !(mode.is_pairing() && self.paired_with.is_some())
    }

    /// Listed in peer broadcasts: counted and named.
    pub fn is_eligible(&self, mode: RelayMode) -> bool {
        !self.display_name.is_empty() && self.is_counted(mode)
    }

    /// Peer list entry.
    pub fn peer_entry(&self) -> PeerEntry {
        PeerEntry {
            name: self.display_name.clone(),
            index: self.identity.clone(),
        }
    }
}

/// Registry of known identities.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<Identity, Client>,
}

impl ClientRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `identity` is known.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.clients.contains_key(identity)
    }

    /// Look up a client.
    pub fn get(&self, identity: &Identity) -> Option<&Client> {
        self.clients.get(identity)
    }

    /// Register a new identity with an empty name and no partner.
    ///
    /// Replaces any existing record for the identity.
    pub fn insert(&mut self, identity: Identity, connection: Arc<ConnectionHandle>) {
        let client = Client::new(identity.clone(), connection);
        let _ = self.clients.insert(identity, client);
    }

    /// Rebind `identity` to `connection`, returning the previous one.
    pub fn adopt_connection(
        &mut self,
        identity: &Identity,
        connection: Arc<ConnectionHandle>,
    ) -> Option<Arc<ConnectionHandle>> {
        let client = self.clients.get_mut(identity)?;
        Some(std::mem::replace(&mut client.connection, connection))
    }

    /// Set the display name. Returns `false` for an unknown identity.
    pub fn set_name(&mut self, identity: &Identity, name: String) -> bool {
        match self.clients.get_mut(identity) {
            Some(client) => {
                client.display_name = name;
                true
            }
            None => false,
        }
    }

    /// Pair two identities with each other, both sides or neither.
    ///
    /// A previous partner of either side is unpaired so the relation stays
    /// symmetric.
    pub fn establish_pairing(&mut self, a: &Identity, b: &Identity) -> Result<(), RelayError> {
        if a == b {
            return Err(RelayError::SelfPairing(a.clone()));
        }
        for id in [a, b] {
            if !self.clients.contains_key(id) {
                return Err(RelayError::UnknownPeer(id.clone()));
            }
        }

        for id in [a, b] {
            self.unpair(id);
        }
        for (id, partner) in [(a, b), (b, a)] {
            if let Some(client) = self.clients.get_mut(id) {
                client.paired_with = Some(partner.clone());
            }
        }
        Ok(())
    }

    /// Clear `identity`'s pairing and its partner's back-reference.
    pub fn unpair(&mut self, identity: &Identity) {
        let Some(partner) = self
            .clients
            .get_mut(identity)
            .and_then(|client| client.paired_with.take())
        else {
            return;
        };
        if let Some(other) = self.clients.get_mut(&partner) {
            if other.paired_with.as_ref() == Some(identity) {
                other.paired_with = None;
            }
        }
    }

    /// The partner record of `identity`.
    pub fn partner_of(&self, identity: &Identity) -> Result<&Client, RelayError> {
        let client = self
            .clients
            .get(identity)
            .ok_or_else(|| RelayError::UnknownPeer(identity.clone()))?;
        let partner = client
            .paired_with
            .as_ref()
            .ok_or_else(|| RelayError::NotPaired(identity.clone()))?;
        self.clients
            .get(partner)
            .ok_or_else(|| RelayError::UnknownPeer(partner.clone()))
    }

    /// Remove every entry whose connection is not open.
    ///
    /// Survivors paired with a removed identity are unpaired. Returns the
    /// removed identities.
    pub fn sweep(&mut self) -> Vec<Identity> {
        let dead: Vec<Identity> = self
            .clients
            .values()
            .filter(|client| !client.is_open())
            .map(|client| client.identity.clone())
            .collect();
        if dead.is_empty() {
            return dead;
        }

        for id in &dead {
            let _ = self.clients.remove(id);
        }
        {
            let gone: HashSet<&Identity> = dead.iter().collect();
            for client in self.clients.values_mut() {
                if client.paired_with.as_ref().is_some_and(|p| gone.contains(p)) {
                    client.paired_with = None;
                }
            }
        }
        dead
    }

    /// Clients that belong in a peer broadcast.
    pub fn eligible(&self, mode: RelayMode) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|client| client.is_eligible(mode))
            .collect()
    }

    /// Number of open connections (pairing mode: open and unpaired).
    pub fn open_count(&self, mode: RelayMode) -> usize {
        self.clients
            .values()
            .filter(|client| client.is_counted(mode))
            .count()
    }

    /// Any open client other than `except`.
    pub fn find_open_other(&self, except: &Identity) -> Option<&Client> {
        self.clients
            .values()
            .find(|client| &client.identity != except && client.is_open())
    }

    /// Number of entries, open or not.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn conn() -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<str>>) {
        ConnectionHandle::channel(8)
    }

    fn id(raw: &str) -> Identity {
        Identity::from(raw)
    }

    #[test]
    fn insert_and_lookup() {
        let mut reg = ClientRegistry::new();
        let (c, _rx) = conn();
        reg.insert(id("a"), c.clone());
        assert!(reg.contains(&id("a")));
        let client = reg.get(&id("a")).unwrap();
        assert_eq!(client.display_name(), "");
        assert!(client.paired_with().is_none());
        assert_eq!(client.connection().id(), c.id());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn adopt_replaces_connection() {
        let mut reg = ClientRegistry::new();
        let (c1, _rx1) = conn();
        let (c2, _rx2) = conn();
        reg.insert(id("a"), c1.clone());
        let previous = reg.adopt_connection(&id("a"), c2.clone()).unwrap();
        assert_eq!(previous.id(), c1.id());
        assert_eq!(reg.get(&id("a")).unwrap().connection().id(), c2.id());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn adopt_unknown_is_none() {
        let mut reg = ClientRegistry::new();
        let (c, _rx) = conn();
        assert!(reg.adopt_connection(&id("x"), c).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn set_name() {
        let mut reg = ClientRegistry::new();
        let (c, _rx) = conn();
        reg.insert(id("a"), c);
        assert!(reg.set_name(&id("a"), "ann".into()));
        assert_eq!(reg.get(&id("a")).unwrap().display_name(), "ann");
        assert!(!reg.set_name(&id("b"), "bob".into()));
    }

    #[test]
    fn eligibility_requires_name_and_open() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();
        let (c, rx_c) = conn();
        reg.insert(id("a"), a);
        reg.insert(id("b"), b);
        reg.insert(id("c"), c);
        let _ = reg.set_name(&id("a"), "ann".into());
        let _ = reg.set_name(&id("c"), "cid".into());
        drop(rx_c);

        let eligible = reg.eligible(RelayMode::Signaling);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].identity(), &id("a"));
        assert_eq!(reg.open_count(RelayMode::Signaling), 2);
    }

    #[test]
    fn paired_clients_excluded_in_pairing_mode_only() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();
        reg.insert(id("a"), a);
        reg.insert(id("b"), b);
        let _ = reg.set_name(&id("a"), "ann".into());
        let _ = reg.set_name(&id("b"), "bob".into());
        reg.establish_pairing(&id("a"), &id("b")).unwrap();

        assert!(reg.eligible(RelayMode::Pairing).is_empty());
        assert_eq!(reg.open_count(RelayMode::Pairing), 0);
        assert_eq!(reg.eligible(RelayMode::Signaling).len(), 2);
        assert_eq!(reg.open_count(RelayMode::Signaling), 2);
    }

    #[test]
    fn pairing_is_symmetric() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();
        reg.insert(id("a"), a);
        reg.insert(id("b"), b);
        reg.establish_pairing(&id("a"), &id("b")).unwrap();
        assert_eq!(reg.partner_of(&id("a")).unwrap().identity(), &id("b"));
        assert_eq!(reg.partner_of(&id("b")).unwrap().identity(), &id("a"));
    }

    #[test]
    fn pairing_with_unknown_changes_nothing() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        reg.insert(id("a"), a);
        let err = reg.establish_pairing(&id("a"), &id("ghost")).unwrap_err();
        assert!(matches!(err, RelayError::UnknownPeer(ref p) if p == &id("ghost")));
        assert!(reg.get(&id("a")).unwrap().paired_with().is_none());
    }

    #[test]
    fn self_pairing_rejected() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        reg.insert(id("a"), a);
        assert!(matches!(
            reg.establish_pairing(&id("a"), &id("a")),
            Err(RelayError::SelfPairing(_))
        ));
    }

    #[test]
    fn repairing_releases_old_partner() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        let (b, _rx_b) = conn();
        let (c, _rx_c) = conn();
        reg.insert(id("a"), a);
        reg.insert(id("b"), b);
        reg.insert(id("c"), c);
        reg.establish_pairing(&id("a"), &id("b")).unwrap();
        reg.establish_pairing(&id("a"), &id("c")).unwrap();

        assert!(reg.get(&id("b")).unwrap().paired_with().is_none());
        assert_eq!(reg.partner_of(&id("c")).unwrap().identity(), &id("a"));
        assert_eq!(reg.partner_of(&id("a")).unwrap().identity(), &id("c"));
    }

    #[test]
    fn partner_of_errors() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        reg.insert(id("a"), a);
        assert!(matches!(reg.partner_of(&id("a")), Err(RelayError::NotPaired(_))));
        assert!(matches!(reg.partner_of(&id("z")), Err(RelayError::UnknownPeer(_))));
    }

    #[test]
    fn sweep_removes_closed_and_unpairs_survivors() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        let (b, rx_b) = conn();
        let (c, _rx_c) = conn();
        reg.insert(id("a"), a);
        reg.insert(id("b"), b);
        reg.insert(id("c"), c.clone());
        reg.establish_pairing(&id("a"), &id("b")).unwrap();
        drop(rx_b);
        c.close();

        let mut removed = reg.sweep();
        removed.sort();
        assert_eq!(removed, vec![id("b"), id("c")]);
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&id("a")).unwrap().paired_with().is_none());
    }

    #[test]
    fn sweep_with_nothing_dead() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        reg.insert(id("a"), a);
        assert!(reg.sweep().is_empty());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn find_open_other_skips_self_and_closed() {
        let mut reg = ClientRegistry::new();
        let (a, _rx_a) = conn();
        let (b, rx_b) = conn();
        reg.insert(id("a"), a);
        reg.insert(id("b"), b);
        drop(rx_b);
        assert!(reg.find_open_other(&id("a")).is_none());

        let (c, _rx_c) = conn();
        reg.insert(id("c"), c);
        assert_eq!(reg.find_open_other(&id("a")).unwrap().identity(), &id("c"));
    }
}
