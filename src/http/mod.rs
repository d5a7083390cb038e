//! HTTP-CONNECT proxy front-end
//!
//! An HTTP/1.1 entry point that resolves the target from a `CONNECT`
//! request or an absolute-URI request instead of a SOCKS5 request, then
//! reuses the same [`Address`](crate::socks::Address), handler and relay.

pub mod auth;
pub mod request;
pub mod server;
#[cfg(feature = "rustls-tls")]
pub mod tls;

pub use auth::{parse_basic_auth, AuthDecision};
pub use request::ProxyRequest;
pub use server::{HttpServer, HttpSessionEnd};
#[cfg(feature = "rustls-tls")]
pub use tls::load_tls_acceptor;
