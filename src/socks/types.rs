//! SOCKS5 value types
//!
//! Method codes and reply codes are kept as byte newtypes rather than closed
//! enums: a peer may put any byte on the wire, and the protocol has to carry
//! it through (e.g. a server selecting a method the client never offered).

use super::consts::*;
use std::fmt;
use std::io;

/// Authentication method code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method(pub u8);

impl Method {
    /// No authentication required
    pub const NO_AUTH: Method = Method(SOCKS5_AUTH_METHOD_NONE);
    /// GSSAPI
    pub const GSSAPI: Method = Method(SOCKS5_AUTH_METHOD_GSSAPI);
    /// Username/password
    pub const USER_PASS: Method = Method(SOCKS5_AUTH_METHOD_PASSWORD);
    /// No acceptable method
    pub const NOT_SUPPORTED: Method = Method(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE);

    /// Short name of the method, empty for unassigned codes
    pub fn as_str(self) -> &'static str {
        match self {
            Method::NO_AUTH => "noauth",
            Method::GSSAPI => "gssapi",
            Method::USER_PASS => "user/pass",
            Method::NOT_SUPPORTED => "not support",
            _ => "",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            "" => write!(f, "method({:#04x})", self.0),
            name => f.write_str(name),
        }
    }
}

impl From<u8> for Method {
    fn from(byte: u8) -> Self {
        Method(byte)
    }
}

impl From<Method> for u8 {
    fn from(method: Method) -> Self {
        method.0
    }
}

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - decoded but never executed
    Bind,
    /// UDP ASSOCIATE - decoded but never executed
    UdpAssociate,
    /// Any other command byte, preserved as received
    Unknown(u8),
}

impl SocksCommand {
    /// Parse a command byte. Never fails: unassigned bytes map to `Unknown`.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => SocksCommand::Connect,
            SOCKS5_CMD_TCP_BIND => SocksCommand::Bind,
            SOCKS5_CMD_UDP_ASSOCIATE => SocksCommand::UdpAssociate,
            other => SocksCommand::Unknown(other),
        }
    }

    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
            SocksCommand::Unknown(byte) => byte,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
            SocksCommand::Unknown(byte) => write!(f, "UNKNOWN({:#04x})", byte),
        }
    }
}

/// Reply code sent in the second byte of a SOCKS5 reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reply(pub u8);

impl Reply {
    /// Succeeded
    pub const OK: Reply = Reply(SOCKS5_REPLY_SUCCEEDED);
    /// Connection refused
    pub const CONNECTION_REFUSED: Reply = Reply(SOCKS5_REPLY_CONNECTION_REFUSED);
    /// Connection not allowed by ruleset
    pub const RULE_DISABLED: Reply = Reply(SOCKS5_REPLY_RULE_DISABLED);
    /// Network unreachable
    pub const NETWORK_UNAVAILABLE: Reply = Reply(SOCKS5_REPLY_NETWORK_UNREACHABLE);
    /// Host unreachable
    pub const HOST_UNAVAILABLE: Reply = Reply(SOCKS5_REPLY_HOST_UNREACHABLE);
    /// Connection reset by peer
    pub const RESET_BY_PEER: Reply = Reply(SOCKS5_REPLY_RESET_BY_PEER);
    /// TTL expired
    pub const TTL_EXPIRED: Reply = Reply(SOCKS5_REPLY_TTL_EXPIRED);
    /// Command not supported
    pub const UNSUPPORTED_COMMAND: Reply = Reply(SOCKS5_REPLY_COMMAND_NOT_SUPPORTED);
    /// Address type not supported
    pub const UNSUPPORTED_ADDRESS: Reply = Reply(SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED);

    /// Human readable form of the reply; empty for codes outside the table.
    pub fn as_str(self) -> &'static str {
        match self {
            Reply::OK => "ok",
            Reply::CONNECTION_REFUSED => "connection refused",
            Reply::RULE_DISABLED => "rule mismatch",
            Reply::NETWORK_UNAVAILABLE => "network unavailable",
            Reply::HOST_UNAVAILABLE => "host unavailable",
            Reply::RESET_BY_PEER => "connection reset by peer",
            Reply::TTL_EXPIRED => "ttl expired",
            Reply::UNSUPPORTED_COMMAND => "unsupported command",
            Reply::UNSUPPORTED_ADDRESS => "unsupported address",
            _ => "",
        }
    }

    /// Whether this is the success code
    pub fn is_success(self) -> bool {
        self == Reply::OK
    }

    /// Map an upstream connect failure onto a reply code.
    ///
    /// The error kind is checked first; the message text is the fallback for
    /// errors that only carry an OS string (or were built by a custom
    /// dialer from one).
    pub fn from_connect_error(err: &io::Error) -> Reply {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Reply::CONNECTION_REFUSED,
            io::ErrorKind::TimedOut => Reply::HOST_UNAVAILABLE,
            _ => Reply::from_error_text(&err.to_string()),
        }
    }

    /// Substring classification of an error message.
    pub fn from_error_text(text: &str) -> Reply {
        let text = text.to_ascii_lowercase();
        if text.contains("refused") {
            Reply::CONNECTION_REFUSED
        } else if text.contains("network is unreachable") {
            Reply::NETWORK_UNAVAILABLE
        } else {
            Reply::UNSUPPORTED_COMMAND
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<u8> for Reply {
    fn from(byte: u8) -> Self {
        Reply(byte)
    }
}

impl From<Reply> for u8 {
    fn from(reply: Reply) -> Self {
        reply.0
    }
}
