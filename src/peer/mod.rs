//! Remote node descriptors and the keys nodes identify themselves with.

pub mod identity;

use std::fmt;
use std::str::FromStr;

pub use identity::IdentityError;
pub use identity::KeyPair;
pub use identity::PeerIdentity;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PeerNodeParseError {
    #[error("expected <identity>@<host>:<port>, got '{0}'")]
    MissingIdentity(String),

    #[error("expected <host>:<port>, got '{0}'")]
    MissingPort(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("empty host")]
    EmptyHost,

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Network location of a node. The host is resolved when dialing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeEndpoint {
    pub host: String,
    pub port: u16,
}

impl NodeEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // bracket IPv6 literals so the port stays unambiguous
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<std::net::SocketAddr> for NodeEndpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl FromStr for NodeEndpoint {
    type Err = PeerNodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| PeerNodeParseError::MissingPort(s.to_owned()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(PeerNodeParseError::EmptyHost);
        }
        let port = port
            .parse()
            .map_err(|_| PeerNodeParseError::InvalidPort(port.to_owned()))?;

        Ok(Self::new(host, port))
    }
}

/// A node this node may connect to: where it is and which key it must prove
/// it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerNode {
    pub identity: PeerIdentity,
    pub endpoint: NodeEndpoint,

    /// Human readable label, only used in logs.
    pub name: Option<String>,
}

impl PeerNode {
    pub fn new(identity: PeerIdentity, endpoint: NodeEndpoint) -> Self {
        Self {
            identity,
            endpoint,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for PeerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({}@{})", name, self.identity.short(), self.endpoint),
            None => write!(f, "{}@{}", self.identity.short(), self.endpoint),
        }
    }
}

/// Parses `<identity-hex>@<host>:<port>`.
impl FromStr for PeerNode {
    type Err = PeerNodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (identity, endpoint) = s
            .split_once('@')
            .ok_or_else(|| PeerNodeParseError::MissingIdentity(s.to_owned()))?;

        Ok(Self::new(identity.parse()?, endpoint.parse()?))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use assert2::assert;
    use assert2::let_assert;

    use super::*;

    #[test]
    fn parse_peer_node() {
        let identity = KeyPair::generate().identity();
        let node: PeerNode = format!("{}@127.0.0.1:9798", identity).parse().unwrap();

        assert!(node.identity == identity);
        assert!(node.endpoint == NodeEndpoint::new("127.0.0.1", 9798));
        assert!(node.name.is_none());
    }

    #[test]
    fn parse_ipv6_endpoint() {
        let endpoint: NodeEndpoint = "[::1]:9798".parse().unwrap();
        assert!(endpoint.host == "::1");
        assert!(endpoint.port == 9798);
        assert!(endpoint.to_string() == "[::1]:9798");
    }

    #[test]
    fn parse_rejects_missing_identity() {
        let_assert!(
            Err(PeerNodeParseError::MissingIdentity(_)) = "127.0.0.1:9798".parse::<PeerNode>()
        );
    }

    #[test]
    fn parse_rejects_bad_port() {
        let identity = KeyPair::generate().identity();
        let_assert!(
            Err(PeerNodeParseError::InvalidPort(port)) =
                format!("{}@localhost:99999", identity).parse::<PeerNode>()
        );
        assert!(port == "99999");
    }

    #[test]
    fn parse_rejects_empty_host() {
        let_assert!(Err(PeerNodeParseError::EmptyHost) = ":80".parse::<NodeEndpoint>());
    }
}
