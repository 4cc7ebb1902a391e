use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::handler::{Logger, NoOpLogger};

pub const DEFAULT_LISTEN_PORT: u16 = 9898;
pub const DEFAULT_DATAGRAM_PORT: u16 = 9899;
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_datagram_port() -> u16 {
    DEFAULT_DATAGRAM_PORT
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_logger() -> Arc<dyn Logger> {
    Arc::new(NoOpLogger)
}

/// Configuration for the transfer server.
///
/// Ports and buffer capacity default to the well-known literals (9898 TCP,
/// 9899 UDP, 1024-byte buffers). Port 0 is honored and resolves to an
/// OS-assigned port, queryable through the dispatcher once bound.
///
/// Deserializable from JSON or any serde format; absent fields take their
/// defaults and the logger always starts as [`NoOpLogger`].
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind both sockets on.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// TCP listener port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// UDP socket port.
    #[serde(default = "default_datagram_port")]
    pub datagram_port: u16,
    /// Capacity of each connection's staging cursor.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Logger for loop diagnostics.
    #[serde(skip, default = "default_logger")]
    pub logger: Arc<dyn Logger>,
}

impl ServerConfig {
    /// Create a new builder for ServerConfig
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            listen_port: DEFAULT_LISTEN_PORT,
            datagram_port: DEFAULT_DATAGRAM_PORT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            logger: default_logger(),
        }
    }
}

/// Builder for ServerConfig.
///
/// All fields are optional and fall back to ServerConfig::default().
pub struct ServerConfigBuilder {
    host: Option<IpAddr>,
    listen_port: Option<u16>,
    datagram_port: Option<u16>,
    buffer_capacity: Option<usize>,
    logger: Option<Arc<dyn Logger>>,
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self {
            host: None,
            listen_port: None,
            datagram_port: None,
            buffer_capacity: None,
            logger: None,
        }
    }

    /// Set the address to bind on
    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the TCP listener port
    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Set the UDP socket port
    pub fn datagram_port(mut self, port: u16) -> Self {
        self.datagram_port = Some(port);
        self
    }

    /// Set the staging cursor capacity
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    /// Set the logger implementation
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the ServerConfig
    pub fn build(self) -> ServerConfig {
        let default = ServerConfig::default();
        ServerConfig {
            host: self.host.unwrap_or(default.host),
            listen_port: self.listen_port.unwrap_or(default.listen_port),
            datagram_port: self.datagram_port.unwrap_or(default.datagram_port),
            buffer_capacity: self.buffer_capacity.unwrap_or(default.buffer_capacity),
            logger: self.logger.unwrap_or(default.logger),
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_well_known_literals() {
        let config = ServerConfig::default();
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.listen_port, 9898);
        assert_eq!(config.datagram_port, 9899);
        assert_eq!(config.buffer_capacity, 1024);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::builder()
            .listen_port(7000)
            .datagram_port(7001)
            .buffer_capacity(4096)
            .build();
        assert_eq!(config.listen_port, 7000);
        assert_eq!(config.datagram_port, 7001);
        assert_eq!(config.buffer_capacity, 4096);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_deserialize_with_partial_fields() {
        let config: ServerConfig = serde_json::from_str(r#"{"listen_port": 7000}"#).unwrap();
        assert_eq!(config.listen_port, 7000);
        assert_eq!(config.datagram_port, 9899);
        assert_eq!(config.buffer_capacity, 1024);
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = ServerConfig::builder().buffer_capacity(2048).build();
        let json = serde_json::to_string(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.buffer_capacity, 2048);
        assert_eq!(back.listen_port, config.listen_port);
    }
}
