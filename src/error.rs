//! Error types for socksrelay
//!
//! `Socks5Error` covers everything that can go wrong on the SOCKS5 wire,
//! on either side of the connection, and `HttpError` the same for the HTTP
//! front-end. Both are handled per session. `ProxyError` is the process
//! level error returned by server setup and accept loops.

use crate::socks::types::Reply;
use std::io;
use thiserror::Error;

/// Main error type for socksrelay operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(String),
}

/// SOCKS5 protocol errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Version byte other than 5 (or 1 in the user/pass sub-negotiation reply)
    #[error("invalid socks version: {0}")]
    Version(u8),

    /// Server selected a method the client did not ask for
    #[error("invalid method: expected {expected}, got {actual}")]
    Method {
        /// Method the client offered
        expected: crate::socks::types::Method,
        /// Method the server answered with
        actual: crate::socks::types::Method,
    },

    /// User/pass sub-negotiation reply carried the wrong version
    #[error("invalid auth version: {0}")]
    AuthVersion(u8),

    /// Credentials rejected
    #[error("invalid auth")]
    AuthFailed,

    /// Unrecognized address type tag
    #[error("unsupported address type: {0:#04x}")]
    MalformedAddress(u8),

    /// Address string could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Non-zero reply code returned by the server
    #[error("{0}")]
    Reply(Reply),

    /// A phase deadline elapsed
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// IO error
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Failure of one client step, labelled with the step name
    #[error("{step}: {source}")]
    Step {
        /// Step that failed
        step: &'static str,
        /// Underlying failure
        source: Box<Socks5Error>,
    },
}

impl Socks5Error {
    /// Wrap an error with the name of the step it happened in
    pub fn step(step: &'static str, err: impl Into<Socks5Error>) -> Self {
        Socks5Error::Step {
            step,
            source: Box::new(err.into()),
        }
    }

    /// The innermost error, looking through `Step` wrappers
    pub fn root(&self) -> &Socks5Error {
        match self {
            Socks5Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is an authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.root(),
            Socks5Error::AuthFailed | Socks5Error::AuthVersion(_)
        )
    }

    /// Whether a version byte was wrong
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self.root(), Socks5Error::Version(_))
    }

    /// Whether a method mismatch ended the negotiation
    pub fn is_method_mismatch(&self) -> bool {
        matches!(self.root(), Socks5Error::Method { .. })
    }

    /// Reply code returned by the server, if the failure was a reply
    pub fn reply(&self) -> Option<Reply> {
        match self.root() {
            Socks5Error::Reply(reply) => Some(*reply),
            _ => None,
        }
    }
}

impl From<Socks5Error> for io::Error {
    fn from(err: Socks5Error) -> Self {
        match err {
            Socks5Error::Io(err) => err,
            Socks5Error::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, err),
            Socks5Error::AuthFailed | Socks5Error::AuthVersion(_) => {
                io::Error::new(io::ErrorKind::PermissionDenied, err)
            }
            Socks5Error::Reply(Reply::CONNECTION_REFUSED) => {
                io::Error::new(io::ErrorKind::ConnectionRefused, err)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// HTTP front-end request errors
#[derive(Error, Debug)]
pub enum HttpError {
    /// Request head could not be parsed
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Request head exceeded the size limit
    #[error("request head too large")]
    HeadTooLarge,

    /// No authority in the request target or Host header
    #[error("missing host")]
    MissingHost,

    /// Authority present but not a usable host:port
    #[error("invalid authority: {0}")]
    InvalidAuthority(String),

    /// Request head did not arrive within the read deadline
    #[error("read request timed out")]
    Timeout,

    /// IO error
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HttpError {
    /// Whether the client should get a 400 before the connection closes
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            HttpError::Malformed(_)
                | HttpError::HeadTooLarge
                | HttpError::MissingHost
                | HttpError::InvalidAuthority(_)
        )
    }
}

/// Result type alias for socksrelay operations
pub type Result<T> = std::result::Result<T, ProxyError>;
