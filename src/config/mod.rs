//! Configuration module for socksrelay
//!
//! This module provides configuration types and parsing for the servers
//! and the client.

mod client;
mod server;

pub use client::ClientConfig;
pub use server::{HttpConfig, Socks5Config};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// SOCKS5 listener
    #[serde(default)]
    pub socks5: Option<Socks5Config>,

    /// HTTP-CONNECT listener
    #[serde(default)]
    pub http: Option<HttpConfig>,

    /// Client defaults
    #[serde(default)]
    pub client: Option<ClientConfig>,
}

impl Config {
    /// Whether any listener section is present
    pub fn has_listener(&self) -> bool {
        self.socks5.is_some() || self.http.is_some()
    }

    /// Validate every present section
    pub fn validate(&self) -> Result<()> {
        if let Some(socks5) = &self.socks5 {
            if let Err(e) = socks5.validate() {
                bail!("[socks5] {}", e);
            }
        }
        if let Some(http) = &self.http {
            if let Err(e) = http.validate() {
                bail!("[http] {}", e);
            }
        }
        if let Some(client) = &self.client {
            if let Err(e) = client.validate() {
                bail!("[client] {}", e);
            }
        }
        Ok(())
    }

    /// Copy with zero timeouts replaced by defaults
    pub fn normalized(self) -> Self {
        Config {
            socks5: self.socks5.map(Socks5Config::normalized),
            http: self.http.map(HttpConfig::normalized),
            client: self.client,
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config.normalized())
}
