//! Connection to the tracking backend

pub mod client;

pub use client::{ConnectionManager, ConnectionStats};

use crate::error::ConnectionError;
use crate::protocol::ClientEvent;

/// Outbound half of a connection, as seen by the session controller
pub trait Emitter {
    fn is_connected(&self) -> bool;

    /// Send one named event; fails with `NotConnected` when there is no link
    fn emit(&self, event: ClientEvent) -> Result<(), ConnectionError>;

    /// Close the link. Best effort, never blocks.
    fn close(&self);
}
