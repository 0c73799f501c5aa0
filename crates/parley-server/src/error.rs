//! Error types for the relay and its server.

use std::net::SocketAddr;

use thiserror::Error;

use crate::protocol::Identity;

/// Failures inside the relay state machine.
///
/// None of these are fatal: the dispatch path logs them and drops the
/// message.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Text frame was not a JSON object of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Message carried no `index`.
    #[error("message has no identity")]
    MissingIdentity,
    /// Referenced identity is not in the registry.
    #[error("unknown peer: {0}")]
    UnknownPeer(Identity),
    /// `start` named the sender itself.
    #[error("cannot pair {0} with itself")]
    SelfPairing(Identity),
    /// Sender has no partner to relay to.
    #[error("{0} is not paired")]
    NotPaired(Identity),
}

/// Failures starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Bound, but could not read back the local address.
    #[error("listener address unavailable: {0}")]
    LocalAddr(#[source] std::io::Error),
    /// Host/port did not form a socket address.
    #[error("invalid listen address {0}")]
    InvalidAddr(String),
}

impl ServerError {
    pub(crate) fn bind(addr: &SocketAddr, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}
