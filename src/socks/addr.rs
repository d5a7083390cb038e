//! SOCKS5 address codec
//!
//! ```text
//! +------+----------+----------+
//! | ATYP | DST.ADDR | DST.PORT |
//! +------+----------+----------+
//! |  1   | Variable |    2     |
//! +------+----------+----------+
//! ```
//!
//! IPv4 carries 4 address bytes, IPv6 16, and a domain is a one byte length
//! followed by that many bytes. The port is big-endian.

use super::consts::*;
use crate::error::Socks5Error;
use crate::helper::{deadline, split_host_port};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Kind of address carried by an [`Address`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrKind {
    /// IPv4 address
    Ipv4,
    /// IPv6 address
    Ipv6,
    /// Domain name
    Domain,
    /// Error path placeholder
    Unknown,
}

/// Network endpoint as transmitted on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
    /// Placeholder used only to produce some reply body on failure
    Unknown,
}

impl Address {
    /// Create an address from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        Address::Ip(SocketAddr::V4(SocketAddrV4::new(ip, port)))
    }

    /// Create an address from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        Address::Ip(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0)))
    }

    /// Create a domain address
    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        Address::Domain(domain.into(), port)
    }

    /// Build an address from a host (IP literal, optionally bracketed, or
    /// domain name) and a port
    pub fn from_host_port(host: &str, port: u16) -> Self {
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        match bare.parse::<IpAddr>() {
            Ok(ip) => Address::Ip(SocketAddr::new(ip, port)),
            Err(_) => Address::Domain(host.to_string(), port),
        }
    }

    /// Kind of this address
    pub fn kind(&self) -> AddrKind {
        match self {
            Address::Ip(SocketAddr::V4(_)) => AddrKind::Ipv4,
            Address::Ip(SocketAddr::V6(_)) => AddrKind::Ipv6,
            Address::Domain(..) => AddrKind::Domain,
            Address::Unknown => AddrKind::Unknown,
        }
    }

    /// Port number (zero for the placeholder)
    pub fn port(&self) -> u16 {
        match self {
            Address::Ip(addr) => addr.port(),
            Address::Domain(_, port) => *port,
            Address::Unknown => 0,
        }
    }

    /// Address type tag for this address
    pub fn addr_type(&self) -> u8 {
        match self.kind() {
            AddrKind::Ipv4 => SOCKS5_ADDR_TYPE_IPV4,
            AddrKind::Ipv6 => SOCKS5_ADDR_TYPE_IPV6,
            AddrKind::Domain => SOCKS5_ADDR_TYPE_DOMAIN,
            AddrKind::Unknown => SOCKS5_ADDR_TYPE_UNKNOWN,
        }
    }

    /// Serialize the address to its wire form.
    ///
    /// Domains longer than 255 bytes are cut at 255 bytes. The placeholder
    /// encodes as `0.0.0.0:0`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());

        match self {
            Address::Ip(SocketAddr::V4(addr)) => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV4);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            Address::Ip(SocketAddr::V6(addr)) => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV6);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            Address::Domain(domain, port) => {
                let raw = &domain.as_bytes()[..domain.len().min(MAX_DOMAIN_LEN)];
                bytes.push(SOCKS5_ADDR_TYPE_DOMAIN);
                bytes.push(raw.len() as u8);
                bytes.extend_from_slice(raw);
                bytes.extend_from_slice(&port.to_be_bytes());
            }
            Address::Unknown => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV4);
                bytes.extend_from_slice(&[0; 6]);
            }
        }

        bytes
    }

    /// Number of bytes `to_bytes` produces
    pub fn encoded_len(&self) -> usize {
        match self {
            Address::Ip(SocketAddr::V4(_)) | Address::Unknown => 1 + 4 + 2,
            Address::Ip(SocketAddr::V6(_)) => 1 + 16 + 2,
            Address::Domain(domain, _) => 1 + 1 + domain.len().min(MAX_DOMAIN_LEN) + 2,
        }
    }

    /// Read one address (tag, body, port) from `reader`
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, Socks5Error>
    where
        R: AsyncRead + Unpin,
    {
        let addr_type = reader.read_u8().await?;

        let addr = match addr_type {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let mut ip = [0u8; 4];
                reader.read_exact(&mut ip).await?;
                let port = reader.read_u16().await?;
                Address::ipv4(Ipv4Addr::from(ip), port)
            }
            SOCKS5_ADDR_TYPE_IPV6 => {
                let mut ip = [0u8; 16];
                reader.read_exact(&mut ip).await?;
                let port = reader.read_u16().await?;
                Address::ipv6(Ipv6Addr::from(ip), port)
            }
            SOCKS5_ADDR_TYPE_DOMAIN => {
                let len = reader.read_u8().await? as usize;
                let mut domain = vec![0u8; len];
                reader.read_exact(&mut domain).await?;
                let port = reader.read_u16().await?;
                Address::Domain(String::from_utf8_lossy(&domain).into_owned(), port)
            }
            other => return Err(Socks5Error::MalformedAddress(other)),
        };

        Ok(addr)
    }

    /// Read one address, failing with a timeout if the bytes do not arrive
    /// within `timeout`
    pub async fn decode<R>(reader: &mut R, timeout: Duration) -> Result<Self, Socks5Error>
    where
        R: AsyncRead + Unpin,
    {
        deadline(timeout, "read address", Self::read_from(reader)).await
    }

    /// Resolve to a socket address, performing DNS lookup for domains
    pub async fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        match self {
            Address::Ip(addr) => Ok(vec![*addr]),
            Address::Domain(domain, port) => {
                Ok(tokio::net::lookup_host((domain.as_str(), *port)).await?.collect())
            }
            Address::Unknown => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot resolve unknown address",
            )),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip(addr) => write!(f, "{}", addr),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
            Address::Unknown => Ok(()),
        }
    }
}

impl FromStr for Address {
    type Err = Socks5Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_host_port(s) {
            Some((host, Some(port))) if !host.is_empty() => Ok(Address::from_host_port(host, port)),
            _ => Err(Socks5Error::InvalidAddress(s.to_string())),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Ip(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn decode_bytes(bytes: &[u8]) -> Result<Address, Socks5Error> {
        let mut cursor = Cursor::new(bytes.to_vec());
        Address::decode(&mut cursor, Duration::from_secs(1)).await
    }

    #[test]
    fn test_address_kind_and_port() {
        let addr = Address::ipv4(Ipv4Addr::new(192, 168, 1, 1), 8080);
        assert_eq!(addr.kind(), AddrKind::Ipv4);
        assert_eq!(addr.port(), 8080);

        let addr = Address::ipv6(Ipv6Addr::LOCALHOST, 443);
        assert_eq!(addr.kind(), AddrKind::Ipv6);
        assert_eq!(addr.addr_type(), SOCKS5_ADDR_TYPE_IPV6);

        let addr = Address::domain("example.com", 80);
        assert_eq!(addr.kind(), AddrKind::Domain);

        assert_eq!(Address::Unknown.kind(), AddrKind::Unknown);
        assert_eq!(Address::Unknown.addr_type(), SOCKS5_ADDR_TYPE_UNKNOWN);
        assert_eq!(Address::Unknown.port(), 0);
    }

    #[test]
    fn test_to_bytes_ipv4() {
        let bytes = Address::ipv4(Ipv4Addr::new(192, 168, 1, 1), 8080).to_bytes();
        assert_eq!(bytes, vec![0x01, 192, 168, 1, 1, 0x1F, 0x90]);
    }

    #[test]
    fn test_to_bytes_domain() {
        let bytes = Address::domain("test", 80).to_bytes();
        assert_eq!(bytes[0], SOCKS5_ADDR_TYPE_DOMAIN);
        assert_eq!(bytes[1], 4);
        assert_eq!(&bytes[2..6], b"test");
        assert_eq!(&bytes[6..8], &80u16.to_be_bytes());
    }

    #[test]
    fn test_to_bytes_unknown_is_ipv4_placeholder() {
        assert_eq!(Address::Unknown.to_bytes(), vec![0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Address::Unknown.encoded_len(), 7);
    }

    #[test]
    fn test_to_bytes_long_domain_truncated() {
        let long = "a".repeat(300);
        let bytes = Address::domain(long, 443).to_bytes();
        assert_eq!(bytes[1], 255);
        assert_eq!(bytes.len(), 1 + 1 + 255 + 2);
        assert_eq!(&bytes[257..259], &443u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_decode_round_trip() {
        let addrs = [
            Address::ipv4(Ipv4Addr::new(10, 0, 0, 1), 0),
            Address::ipv6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1), 65535),
            Address::domain("example.com", 443),
            Address::domain("x".repeat(255), 1),
        ];
        for addr in addrs {
            let decoded = decode_bytes(&addr.to_bytes()).await.unwrap();
            assert_eq!(decoded, addr);
        }
    }

    #[tokio::test]
    async fn test_decode_unknown_tag() {
        let err = decode_bytes(&[0x05, 1, 2, 3, 4, 0, 80]).await.unwrap_err();
        assert!(matches!(err, Socks5Error::MalformedAddress(0x05)));
    }

    #[tokio::test]
    async fn test_decode_truncated() {
        let err = decode_bytes(&[0x01, 127, 0, 0]).await.unwrap_err();
        assert!(matches!(err, Socks5Error::Io(_)));
    }

    #[tokio::test]
    async fn test_decode_times_out() {
        let (mut client, _server) = tokio::io::duplex(64);
        let err = Address::decode(&mut client, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Socks5Error::Timeout(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Address::ipv4(Ipv4Addr::LOCALHOST, 80).to_string(), "127.0.0.1:80");
        assert_eq!(Address::ipv6(Ipv6Addr::LOCALHOST, 80).to_string(), "[::1]:80");
        assert_eq!(Address::domain("a.b", 1).to_string(), "a.b:1");
        assert_eq!(Address::Unknown.to_string(), "");
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "127.0.0.1:1080".parse::<Address>().unwrap(),
            Address::ipv4(Ipv4Addr::LOCALHOST, 1080)
        );
        assert_eq!(
            "[::1]:443".parse::<Address>().unwrap(),
            Address::ipv6(Ipv6Addr::LOCALHOST, 443)
        );
        assert_eq!(
            "example.com:80".parse::<Address>().unwrap(),
            Address::domain("example.com", 80)
        );
        assert!("example.com".parse::<Address>().is_err());
        assert!(":80".parse::<Address>().is_err());
        assert!("host:99999".parse::<Address>().is_err());
    }

    #[tokio::test]
    async fn test_resolve_ip() {
        let addr = Address::ipv4(Ipv4Addr::LOCALHOST, 8080);
        let resolved = addr.resolve().await.unwrap();
        assert_eq!(resolved, vec!["127.0.0.1:8080".parse().unwrap()]);
        assert!(Address::Unknown.resolve().await.is_err());
    }
}
