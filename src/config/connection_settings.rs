//! Settings governing outbound connection attempts.

use std::time::Duration;

use bytesize::ByteSize;

/// Default deadline for connecting and verifying a peer.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum length of a single packet's payload.
pub const DEFAULT_MAX_PACKET_DATA_SIZE: usize = 150 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max packet data size must be non-zero")]
    ZeroMaxPacketDataSize,

    #[error("max outstanding connections must be non-zero when set")]
    ZeroMaxOutstandingConnections,
}

/// Immutable configuration of a [`ServerConnector`](crate::ServerConnector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Deadline covering both the raw connect and the verification exchange.
    /// Zero times out immediately.
    pub timeout: Duration,

    /// Cap on attempts that may be connecting or verifying at once. Attempts
    /// beyond the cap wait for a slot, with their deadline running.
    pub max_outstanding_connections: Option<usize>,

    /// When false, connecting to a node whose identity is already connected
    /// or being connected resolves as `AlreadyConnected`.
    pub allow_duplicate_connections: bool,

    /// Largest frame the packet codec accepts, in bytes.
    pub max_packet_data_size: usize,

    /// Disable Nagle's algorithm on dialed streams.
    pub tcp_nodelay: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
            max_outstanding_connections: None,
            allow_duplicate_connections: true,
            max_packet_data_size: DEFAULT_MAX_PACKET_DATA_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl ConnectionSettings {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_outstanding_connections(mut self, max: Option<usize>) -> Self {
        self.max_outstanding_connections = max;
        self
    }

    pub fn with_allow_duplicate_connections(mut self, allow: bool) -> Self {
        self.allow_duplicate_connections = allow;
        self
    }

    pub fn with_max_packet_data_size(mut self, size: ByteSize) -> Self {
        self.max_packet_data_size = usize::try_from(size.as_u64()).unwrap_or(usize::MAX);
        self
    }

    pub fn with_tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_packet_data_size == 0 {
            return Err(ConfigError::ZeroMaxPacketDataSize);
        }
        if self.max_outstanding_connections == Some(0) {
            return Err(ConfigError::ZeroMaxOutstandingConnections);
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = ConnectionSettings::default();
        assert_eq!(Ok(()), settings.validate());
        assert_eq!(Duration::from_secs(10), settings.timeout);
        assert!(settings.allow_duplicate_connections);
        assert_eq!(None, settings.max_outstanding_connections);
    }

    #[test]
    fn zero_packet_size_is_rejected() {
        let settings = ConnectionSettings::default().with_max_packet_data_size(ByteSize::b(0));
        assert_eq!(Err(ConfigError::ZeroMaxPacketDataSize), settings.validate());
    }

    #[test]
    fn zero_outstanding_cap_is_rejected() {
        let settings = ConnectionSettings::default().with_max_outstanding_connections(Some(0));
        assert_eq!(
            Err(ConfigError::ZeroMaxOutstandingConnections),
            settings.validate()
        );
    }

    #[test]
    fn zero_timeout_is_valid() {
        let settings = ConnectionSettings::default().with_timeout(Duration::ZERO);
        assert_eq!(Ok(()), settings.validate());
    }
}
