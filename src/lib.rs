#![deny(clippy::shadow_unrelated)]
//
// If code coverage tool `cargo-llvm-cov` is running with the nightly toolchain,
// enable the unstable “coverage” attribute. This allows using the annotation
// `#[coverage(off)]` to explicitly exclude certain parts of the code from
// being considered as “code under test.” Since the “coverage” feature is
// enabled only conditionally, the annotation to use is:
// `#[cfg_attr(coverage_nightly, coverage(off))]`.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Outbound peer connector.
//!
//! Opens connections to other nodes, proves both sides hold the keys they
//! claim through a challenge-response exchange, bounds every attempt with a
//! timeout and tracks the verified connections until they close or the
//! connector shuts down.

pub mod config;
pub mod connection;
pub mod peer;
pub mod protocol;


pub use config::ConnectionSettings;
pub use connection::ConnectResult;
pub use connection::PeerSocket;
pub use connection::ServerConnector;
pub use peer::KeyPair;
pub use peer::PeerIdentity;
pub use peer::PeerNode;

/// Crate version, reported by the binary on startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
