//! # parley-server
//!
//! WebSocket signaling relay.
//!
//! - Identity registry: one record per client-chosen identity, healed on reconnect
//! - Relay state machine: reconciliation, command dispatch, peer broadcast, pairing
//! - Hub: single task that owns the relay and serializes every mutation
//! - Janitor: periodic sweep of dead registry entries
//! - Axum transport: WebSocket upgrade, static fallback, health check

#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod hub;
pub mod janitor;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;

pub use error::{RelayError, ServerError};
pub use parley_settings::RelayMode;
pub use relay::Relay;
pub use server::{ServerConfig, ServerHandle, start};
