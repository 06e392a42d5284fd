//! Connector configuration and the command line of the `neptune-connect`
//! binary.

pub mod cli_args;
pub mod connection_settings;

pub use connection_settings::ConfigError;
pub use connection_settings::ConnectionSettings;
