//! SOCKS5 protocol constants
//!
//! Byte values from RFC 1928 (method negotiation, requests, replies) and
//! RFC 1929 (username/password sub-negotiation).

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// Username/password sub-negotiation version
pub const SOCKS5_AUTH_VERSION: u8 = 0x01;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// GSSAPI (recognized, never selected)
pub const SOCKS5_AUTH_METHOD_GSSAPI: u8 = 0x01;
/// Username/password authentication
pub const SOCKS5_AUTH_METHOD_PASSWORD: u8 = 0x02;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// Sub-negotiation status
/// Credentials accepted
pub const SOCKS5_AUTH_SUCCESS: u8 = 0x00;
/// Credentials rejected
pub const SOCKS5_AUTH_FAILURE: u8 = 0x01;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// TCP BIND command (decoded, always rejected)
pub const SOCKS5_CMD_TCP_BIND: u8 = 0x02;
/// UDP ASSOCIATE command (decoded, always rejected)
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;
/// Internal placeholder for an address that could not be decoded
pub const SOCKS5_ADDR_TYPE_UNKNOWN: u8 = 0xFF;

// Reply codes
/// Succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;
/// Connection refused
pub const SOCKS5_REPLY_CONNECTION_REFUSED: u8 = 0x01;
/// Connection not allowed by ruleset
pub const SOCKS5_REPLY_RULE_DISABLED: u8 = 0x02;
/// Network unreachable
pub const SOCKS5_REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
/// Host unreachable
pub const SOCKS5_REPLY_HOST_UNREACHABLE: u8 = 0x04;
/// Connection reset by peer
pub const SOCKS5_REPLY_RESET_BY_PEER: u8 = 0x05;
/// TTL expired
pub const SOCKS5_REPLY_TTL_EXPIRED: u8 = 0x06;
/// Command not supported
pub const SOCKS5_REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
/// Address type not supported
pub const SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;
/// Maximum username/password length on the wire
pub const MAX_CREDENTIAL_LEN: usize = 255;
/// Relay copy buffer size
pub const RELAY_BUFFER_SIZE: usize = 32 * 1024;
