//! Set of verified connections currently open.
//!
//! Every mutation holds the lock only for the map operation. Sockets taken
//! out of the map are closed after the lock is released, so a slow close
//! never stalls other completions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tokio::time::Instant;
use tracing::debug;

use super::lock;
use super::PeerSocket;
use crate::peer::NodeEndpoint;
use crate::peer::PeerIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("registry is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}

/// A verified connection owned by the registry. Dropping it closes the
/// socket.
#[derive(Debug)]
struct ActiveConnection {
    identity: PeerIdentity,
    endpoint: NodeEndpoint,
    socket: PeerSocket,
    established: Instant,
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.socket.close();
    }
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub handle: ConnectionHandle,
    pub identity: PeerIdentity,
    pub endpoint: NodeEndpoint,
    pub socket: PeerSocket,
    pub established: Instant,
}

#[derive(Debug, Default)]
struct RegistryState {
    closed: bool,
    next_handle: u64,
    connections: HashMap<ConnectionHandle, ActiveConnection>,
}

#[derive(Debug, Default)]
pub struct ActiveConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ActiveConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a verified connection. Once the registry is closed
    /// the socket is closed instead.
    pub fn insert(
        &self,
        identity: PeerIdentity,
        endpoint: NodeEndpoint,
        socket: PeerSocket,
    ) -> Result<ConnectionHandle, RegistryError> {
        let handle = {
            let mut state = lock(&self.state);
            if state.closed {
                None
            } else {
                let handle = ConnectionHandle(state.next_handle);
                state.next_handle += 1;
                state.connections.insert(
                    handle,
                    ActiveConnection {
                        identity,
                        endpoint,
                        socket: socket.clone(),
                        established: Instant::now(),
                    },
                );
                Some(handle)
            }
        };

        match handle {
            Some(handle) => {
                debug!("Registered {handle} to {}", identity.short());
                Ok(handle)
            }
            None => {
                socket.close();
                Err(RegistryError::Closed)
            }
        }
    }

    /// Remove and close a connection. Returns false if it was not present.
    pub fn remove(&self, handle: ConnectionHandle) -> bool {
        let removed = lock(&self.state).connections.remove(&handle);
        match removed {
            Some(connection) => {
                debug!("Unregistered {handle} to {}", connection.identity.short());
                drop(connection);
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        lock(&self.state).connections.len()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn contains_identity(&self, identity: &PeerIdentity) -> bool {
        lock(&self.state)
            .connections
            .values()
            .any(|connection| connection.identity == *identity)
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        lock(&self.state)
            .connections
            .iter()
            .map(|(&handle, connection)| ConnectionInfo {
                handle,
                identity: connection.identity,
                endpoint: connection.endpoint.clone(),
                socket: connection.socket.clone(),
                established: connection.established,
            })
            .collect()
    }

    /// Refuse further inserts and close every tracked connection.
    /// Returns the number of connections closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = lock(&self.state);
            state.closed = true;
            state.connections.drain().map(|(_, connection)| connection).collect()
        };

        let num_closed = drained.len();
        if num_closed > 0 {
            debug!("Closing {num_closed} active connections");
        }
        drop(drained);
        num_closed
    }
}
