//! Message events delivered by the listener.

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

/// Identity of one accepted inbound connection.
///
/// The `id` is unique per accept, so two connections from the same peer
/// address (e.g. after a reconnect) are still told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub peer_addr: SocketAddr,
}

impl ConnectionInfo {
    /// Creates an identity with a fresh random id.
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_addr,
        }
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.peer_addr, self.id)
    }
}

/// One reassembled message together with the connection it arrived on.
///
/// Events are transient: each frame produces at most one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub connection: ConnectionInfo,
    pub text: String,
}
