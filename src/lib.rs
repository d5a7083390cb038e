//! # socksrelay - SOCKS5 and HTTP-CONNECT proxy
//!
//! A SOCKS5 client and server plus an HTTP-CONNECT proxy front-end,
//! sharing one address model and one bidirectional relay engine.
//!
//! ## Features
//!
//! - **SOCKS5 server**: no-auth and username/password methods, CONNECT
//!   command, per-phase read/write deadlines, reply codes mapped from
//!   connect failures
//! - **SOCKS5 client**: dials through a SOCKS5 server and hands back the
//!   negotiated stream
//! - **HTTP proxy**: `CONNECT` tunnels and absolute-URI forwarding with
//!   optional Basic proxy auth and TLS
//! - **Pluggable policy**: method selection, credential checks, upstream
//!   dialing and relaying are all behind [`ServerHandler`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksrelay::config::Socks5Config;
//! use socksrelay::socks::Socks5Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Socks5Config::default();
//!     let server = Socks5Server::new(&config);
//!     server.listen_and_serve(config.listen.as_str()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 client  -> Socks5Server -\
//!                                  +-> ServerHandler::connect -> Target
//! HTTP client    -> HttpServer   -/         (relay in both directions)
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod handler;
pub mod helper;
pub mod http;
pub mod relay;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{HttpError, ProxyError, Socks5Error};
pub use handler::{BoxStream, DefaultHandler, ProxyStream, ServerHandler};
pub use http::HttpServer;
pub use relay::{relay, RelayOutcome};
pub use socks::{Address, Socks5Client, Socks5Server};

/// Version of the socksrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
