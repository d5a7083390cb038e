//! Listener configuration
//!
//! One section per front-end: `[socks5]` and `[http]`.

use crate::handler::DefaultHandler;
use crate::helper::{
    duration_from_millis, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_WRITE_TIMEOUT_MS,
};
use crate::socks::session::Timeouts;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_socks5_listen() -> String {
    "0.0.0.0:1080".to_string()
}

fn default_http_listen() -> String {
    "0.0.0.0:8080".to_string()
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

/// SOCKS5 listener configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Socks5Config {
    /// Listen address
    #[serde(default = "default_socks5_listen")]
    pub listen: String,

    /// Per-phase read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Per-write timeout in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Upstream dial timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Enable/disable authentication
    #[serde(default)]
    pub auth_required: bool,

    /// Username for SOCKS5 auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for SOCKS5 auth
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for Socks5Config {
    fn default() -> Self {
        Self {
            listen: default_socks5_listen(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            auth_required: false,
            username: None,
            password: None,
        }
    }
}

impl Socks5Config {
    /// Check if authentication credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_required && !self.has_credentials() {
            return Err("Authentication required but no credentials configured".to_string());
        }
        if self.username.is_some() != self.password.is_some() {
            return Err("username and password must be set together".to_string());
        }
        Ok(())
    }

    /// Copy with zero timeouts replaced by defaults
    pub fn normalized(mut self) -> Self {
        fill_zero(&mut self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        fill_zero(&mut self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS);
        fill_zero(&mut self.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        self
    }

    /// Per-phase deadlines
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            read: duration_from_millis(self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS),
            write: duration_from_millis(self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS),
        }
    }

    /// Default handler carrying this section's credential policy
    pub fn handler(&self) -> DefaultHandler {
        let handler = build_handler(&self.username, &self.password, self.connect_timeout_ms);
        handler.auth_required(self.auth_required)
    }
}

/// HTTP-CONNECT listener configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Listen address
    #[serde(default = "default_http_listen")]
    pub listen: String,

    /// Request head read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Response write timeout in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Upstream dial timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Enforce Basic proxy authentication
    #[serde(default)]
    pub check: bool,

    /// Username for Basic auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for Basic auth
    #[serde(default)]
    pub password: Option<String>,

    /// PEM certificate chain; serves HTTPS when set
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key
    #[serde(default)]
    pub tls_key: Option<PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            check: false,
            username: None,
            password: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl HttpConfig {
    /// Check if authentication credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Whether the listener terminates TLS
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.check && !self.has_credentials() {
            return Err("Basic auth check enabled but no credentials configured".to_string());
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err("tls_cert and tls_key must be set together".to_string());
        }
        Ok(())
    }

    /// Copy with zero timeouts replaced by defaults
    pub fn normalized(mut self) -> Self {
        fill_zero(&mut self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        fill_zero(&mut self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS);
        fill_zero(&mut self.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        self
    }

    /// Request head read deadline
    pub fn read_timeout(&self) -> Duration {
        duration_from_millis(self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS)
    }

    /// Response write deadline
    pub fn write_timeout(&self) -> Duration {
        duration_from_millis(self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS)
    }

    /// Default handler carrying this section's credentials
    pub fn handler(&self) -> DefaultHandler {
        build_handler(&self.username, &self.password, self.connect_timeout_ms)
    }
}

fn fill_zero(value: &mut u64, default: u64) {
    if *value == 0 {
        *value = default;
    }
}

fn build_handler(username: &Option<String>, password: &Option<String>, connect_timeout_ms: u64) -> DefaultHandler {
    let handler = DefaultHandler::new().connect_timeout(duration_from_millis(
        connect_timeout_ms,
        DEFAULT_CONNECT_TIMEOUT_MS,
    ));
    match (username, password) {
        (Some(user), Some(pass)) => handler.with_credentials(user.clone(), pass.clone()),
        _ => handler,
    }
}
