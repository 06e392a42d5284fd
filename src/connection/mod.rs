//! Outbound connection lifecycle.
//!
//! [`ServerConnector::connect`] starts a connection attempt that dials the
//! node, verifies it and, on success, hands the socket to the
//! [`ActiveConnectionRegistry`]. A [`TimeoutGuard`] bounds every attempt.
//! Whichever of completion, timeout or shutdown claims the attempt's outcome
//! first decides the [`ConnectResult`] its callback receives.

pub(crate) mod attempt;
pub mod connector;
pub mod observer;
pub mod outcome;
pub mod registry;
pub mod socket;
pub mod timeout_guard;

use std::fmt;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;

pub use connector::ServerConnector;
pub use observer::AttemptObserver;
pub use observer::TracingObserver;
pub use outcome::AttemptControl;
pub use registry::ActiveConnectionRegistry;
pub use registry::ConnectionHandle;
pub use registry::ConnectionInfo;
pub use socket::PeerSocket;
pub use socket::SocketError;
pub use timeout_guard::TimeoutGuard;

/// Final result of one `connect` call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIs,
)]
pub enum ConnectResult {
    /// Connected and verified. The connection is tracked as active.
    Accepted,

    /// Could not open the stream, or the connector shut down first.
    SocketError,

    /// The stream opened but the peer failed verification.
    VerifyError,

    /// The deadline passed before the peer was verified.
    TimedOut,

    /// A connection to the same identity is already active or in progress
    /// and duplicates are disallowed.
    AlreadyConnected,
}

/// Where an attempt is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIs)]
pub enum AttemptStage {
    Initiating,
    Connecting,
    Verifying,
    Accepted,
    Failed(ConnectResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub(crate) u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt#{}", self.0)
    }
}

/// Lock a mutex whose critical sections never leave the data half-updated,
/// so a panic in another holder does not invalidate it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
