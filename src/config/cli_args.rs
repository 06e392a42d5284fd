use std::time::Duration;

use bytesize::ByteSize;
use clap::Parser;

use super::ConnectionSettings;
use crate::peer::PeerNode;

/// Command-line arguments of the neptune-connect binary
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// Nodes to connect to, given as <identity-hex>@<host>:<port>.
    /// E.g.: --peer 3b6a...c1@10.0.0.7:9798 --peer 9f01...2e@node.example:9798
    #[clap(long = "peer")]
    pub peers: Vec<PeerNode>,

    /// Deadline for connecting to and verifying a single peer.
    ///
    /// E.g. --timeout 2s, --timeout 500ms
    #[clap(long, default_value = "10s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Maximum number of connection attempts in flight at once. Unlimited if
    /// not set.
    #[clap(long)]
    pub max_outstanding_connections: Option<usize>,

    /// Refuse a second connection to a node that is already connected.
    #[clap(long)]
    pub no_duplicate_connections: bool,

    /// Largest packet accepted from a peer.
    ///
    /// Units: B (bytes), K (kilobytes), M (megabytes), G (gigabytes)
    ///
    /// E.g. --max-packet-data-size 150M
    #[clap(long, default_value = "150MiB")]
    pub max_packet_data_size: ByteSize,

    /// Leave Nagle's algorithm enabled on peer connections.
    #[clap(long)]
    pub no_tcp_nodelay: bool,

    /// Hex encoded ed25519 secret key identifying this node. A fresh key is
    /// generated if not set.
    #[clap(long)]
    pub secret_key: Option<String>,

    /// Keep established connections open this long before shutting down.
    ///
    /// E.g. --hold 30s
    #[clap(long, default_value = "0s", value_parser = humantime::parse_duration)]
    pub hold: Duration,

    /// Enable tokio tracing for consumption by the tokio-console application
    /// note: this will silently fail if tokio-console feature is not enabled.
    #[clap(long)]
    pub tokio_console: bool,
}

impl Default for Args {
    fn default() -> Self {
        let empty: Vec<String> = vec![];
        Self::parse_from(empty)
    }
}

impl Args {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings::default()
            .with_timeout(self.timeout)
            .with_max_outstanding_connections(self.max_outstanding_connections)
            .with_allow_duplicate_connections(!self.no_duplicate_connections)
            .with_max_packet_data_size(self.max_packet_data_size)
            .with_tcp_nodelay(!self.no_tcp_nodelay)
    }
}
