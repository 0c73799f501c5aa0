//! Wire format: one flat JSON object per text frame, both directions.
//!
//! Inbound frames select a command with `do` and identify the sender with
//! `index`. Every outbound frame carries a `do` discriminant.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Client-chosen identity, stable across reconnects (`index` on the wire).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a raw identity string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for Identity {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Command selected by the `do` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Request the peer list (or a `pong` with the open count).
    Ping,
    /// Set the display name.
    Nick,
    /// Registration bootstrap, optionally with a rendezvous `room`.
    Reset,
    /// Begin a two-party session with `with` (pairing mode).
    Start,
    /// Relay a move to the partner (pairing mode).
    Go,
    /// Anything else, including a missing `do`.
    Other(String),
}

impl Command {
    /// Parse the `do` field.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or_default() {
            "ping" => Self::Ping,
            "nick" => Self::Nick,
            "reset" => Self::Reset,
            "start" => Self::Start,
            "go" => Self::Go,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Wire name, for logging.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Nick => "nick",
            Self::Reset => "reset",
            Self::Start => "start",
            Self::Go => "go",
            Self::Other(raw) => raw,
        }
    }
}

/// A decoded client message.
///
/// Unknown fields are ignored. Optional fields of the wrong JSON type read
/// as absent, so the frame still reconciles its sender. Only a mistyped
/// `index` makes the whole frame malformed.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Inbound {
    /// Sender identity. Messages without one are dropped.
    #[serde(default)]
    pub index: Option<Identity>,
    /// Raw command name.
    #[serde(rename = "do", default, deserialize_with = "lenient")]
    pub action: Option<String>,
    /// Display name for `nick`.
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    /// Rendezvous hint for `reset`.
    #[serde(default, deserialize_with = "lenient")]
    pub room: Option<String>,
    /// Partner identity for `start`.
    #[serde(default, deserialize_with = "lenient")]
    pub with: Option<Identity>,
    /// Column for `go`, relayed verbatim.
    #[serde(default)]
    pub col: Option<Value>,
    /// Row for `go`, relayed verbatim.
    #[serde(default)]
    pub row: Option<Value>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

impl Inbound {
    /// Sender identity, required for every command.
    pub fn identity(&self) -> Result<&Identity, RelayError> {
        self.index.as_ref().ok_or(RelayError::MissingIdentity)
    }

    /// The parsed command.
    pub fn command(&self) -> Command {
        Command::parse(self.action.as_deref())
    }

    /// Whether a non-empty `room` hint is present.
    pub fn has_room(&self) -> bool {
        self.room.as_deref().is_some_and(|room| !room.is_empty())
    }
}

/// Decode one text frame. Anything but a JSON object is malformed.
pub fn decode(text: &str) -> Result<Inbound, RelayError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(RelayError::Malformed(serde::de::Error::custom(
            "expected a JSON object",
        )));
    }
    Ok(serde_json::from_value(value)?)
}

/// One entry of a peer list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerEntry {
    /// Display name.
    pub name: String,
    /// Identity.
    pub index: Identity,
}

/// Every message the server sends.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "do", rename_all = "lowercase")]
pub enum Outbound {
    /// Current eligible peers, sent to each of them.
    Peers {
        /// Eligible peers.
        peers: Vec<PeerEntry>,
        /// Open connections (pairing mode: open and unpaired).
        count: usize,
    },
    /// Either a count reply (`count`) or a rendezvous hint (`index`, `to`).
    Pong {
        /// Open connections, for the direct ping reply.
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
        /// Recipient of the rendezvous hint.
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<Identity>,
        /// Identity that just joined.
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<Identity>,
    },
    /// Restart the handshake from scratch.
    Reset,
    /// A session has begun. `index` is the recipient, `to` the initiator.
    Start {
        /// Recipient identity.
        index: Identity,
        /// Initiator identity.
        to: Identity,
    },
    /// A move from the partner.
    Go {
        /// Column, as sent.
        col: Value,
        /// Row, as sent.
        row: Value,
    },
    /// Private acknowledgment of a name change.
    Nick {
        /// The sender's own entry.
        peers: PeerEntry,
    },
}

impl Outbound {
    /// Direct `ping` reply.
    pub fn pong_count(count: usize) -> Self {
        Self::Pong {
            count: Some(count),
            index: None,
            to: None,
        }
    }

    /// Rendezvous hint telling `recipient` that `joined` arrived.
    pub fn rendezvous(recipient: Identity, joined: Identity) -> Self {
        Self::Pong {
            count: None,
            index: Some(recipient),
            to: Some(joined),
        }
    }

    /// The `do` value, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Peers { .. } => "peers",
            Self::Pong { .. } => "pong",
            Self::Reset => "reset",
            Self::Start { .. } => "start",
            Self::Go { .. } => "go",
            Self::Nick { .. } => "nick",
        }
    }

    /// Serialize once for fan-out.
    pub fn to_text(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}
