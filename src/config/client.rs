//! SOCKS5 client configuration

use crate::helper::{
    duration_from_millis, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_WRITE_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_server_addr() -> String {
    "127.0.0.1:1080".to_string()
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Client configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// SOCKS5 proxy address (e.g., "127.0.0.1:1080")
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    /// Read timeout for each negotiation step in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Write timeout for each negotiation step in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Timeout for reaching the proxy in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Client config for a proxy at `server_addr` with default timeouts
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server_addr.is_empty() {
            return Err("server_addr is empty".to_string());
        }
        Ok(())
    }

    /// Read deadline per step
    pub fn read_timeout(&self) -> Duration {
        duration_from_millis(self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS)
    }

    /// Write deadline per step
    pub fn write_timeout(&self) -> Duration {
        duration_from_millis(self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS)
    }

    /// Proxy dial deadline
    pub fn connect_timeout(&self) -> Duration {
        duration_from_millis(self.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:1080");
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.write_timeout(), Duration::from_secs(1));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_client_config_zero_timeouts() {
        let config = ClientConfig {
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            ..ClientConfig::new("proxy:1080")
        };
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.write_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_client_config_validate() {
        assert!(ClientConfig::new("proxy:1080").validate().is_ok());
        assert!(ClientConfig::new("").validate().is_err());
    }
}
