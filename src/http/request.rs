//! Proxy request head parsing
//!
//! Reads an HTTP/1.x request head off the raw stream with `httparse`,
//! extracts the target authority and re-serializes the head for
//! forwarding to the origin.

use crate::error::HttpError;
use crate::helper::split_host_port;
use crate::socks::addr::Address;
use bytes::BytesMut;
use httparse::Status;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on the request head
pub const MAX_HEAD_LEN: usize = 64 * 1024;

const INITIAL_HEADERS: usize = 64;

/// Most header fields a head within `MAX_HEAD_LEN` can carry ("a:\r\n")
const MAX_HEADERS: usize = MAX_HEAD_LEN / 4;

/// Headers that carry proxy credentials and never go upstream
const PROXY_AUTH_HEADERS: [&str; 2] = ["proxy-authenticate", "proxy-authorization"];

/// A parsed proxy request head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    /// Request method, as sent
    pub method: String,
    /// Request target, as sent
    pub target: String,
    /// HTTP minor version
    pub version: u8,
    /// Header fields in order
    pub headers: Vec<(String, Vec<u8>)>,
    /// Bytes read past the end of the head
    pub rest: Vec<u8>,
}

impl ProxyRequest {
    /// Parse a complete head from `buf`; `Ok(None)` means more bytes are needed
    pub fn parse(buf: &[u8]) -> Result<Option<Self>, HttpError> {
        let mut capacity = INITIAL_HEADERS;
        loop {
            let mut headers = vec![httparse::EMPTY_HEADER; capacity];
            match Self::parse_with(buf, &mut headers) {
                Err(httparse::Error::TooManyHeaders) if capacity < MAX_HEADERS => {
                    capacity = (capacity * 2).min(MAX_HEADERS);
                }
                Err(e) => return Err(HttpError::Malformed(e.to_string())),
                Ok(parsed) => return Ok(parsed),
            }
        }
    }

    fn parse_with<'b>(
        buf: &'b [u8],
        headers: &mut [httparse::Header<'b>],
    ) -> Result<Option<Self>, httparse::Error> {
        let mut req = httparse::Request::new(headers);

        let len = match req.parse(buf)? {
            Status::Complete(len) => len,
            Status::Partial => return Ok(None),
        };

        // both are set once the head is complete
        let method = req.method.unwrap_or_default();
        let target = req.path.unwrap_or_default();

        Ok(Some(ProxyRequest {
            method: method.to_string(),
            target: target.to_string(),
            version: req.version.unwrap_or(1),
            headers: req
                .headers
                .iter()
                .map(|h| (h.name.to_string(), h.value.to_vec()))
                .collect(),
            rest: buf[len..].to_vec(),
        }))
    }

    /// Whether this is a CONNECT request
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// First header value with this name (case-insensitive), if it is text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
            .map(str::trim)
    }

    /// Authority and origin-form path of an absolute-URI target
    fn split_absolute(&self) -> Option<(&str, &str)> {
        let (_, rest) = self.target.split_once("://")?;
        let (authority, path) = match rest.find(['/', '?']) {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        // drop userinfo
        let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);
        Some((authority, path))
    }

    /// Target authority: the CONNECT target, the absolute-URI authority, or
    /// the Host header
    pub fn authority(&self) -> Option<&str> {
        let authority = if self.is_connect() {
            Some(self.target.as_str())
        } else if let Some((authority, _)) = self.split_absolute() {
            Some(authority)
        } else {
            self.header("host")
        };
        authority.filter(|a| !a.is_empty())
    }

    /// Path for the origin-form request line
    pub fn origin_path(&self) -> &str {
        match self.split_absolute() {
            Some((_, "")) => "/",
            Some((_, path)) => path,
            None => &self.target,
        }
    }

    /// Upstream address. A missing or zero port becomes 443 for CONNECT and
    /// 80 otherwise.
    pub fn target_address(&self) -> Result<Address, HttpError> {
        let authority = self.authority().ok_or(HttpError::MissingHost)?;
        let (host, port) = split_host_port(authority)
            .ok_or_else(|| HttpError::InvalidAuthority(authority.to_string()))?;
        if host.is_empty() {
            return Err(HttpError::InvalidAuthority(authority.to_string()));
        }

        let port = match port {
            Some(port) if port != 0 => port,
            _ if self.is_connect() => 443,
            _ => 80,
        };
        Ok(Address::from_host_port(host, port))
    }

    /// Re-serialize the head in origin-form for the upstream server.
    ///
    /// The Host header is always present and comes first; proxy credential
    /// headers are dropped. Bytes already read past the head follow.
    pub fn to_upstream_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.rest.len());
        out.extend_from_slice(
            format!("{} {} HTTP/1.{}\r\n", self.method, self.origin_path(), self.version).as_bytes(),
        );

        let host = self.header("host").or_else(|| self.authority()).unwrap_or("");
        out.extend_from_slice(format!("Host: {}\r\n", host).as_bytes());

        for (name, value) in &self.headers {
            let lower = name.to_ascii_lowercase();
            if lower == "host" || PROXY_AUTH_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.rest);
        out
    }
}

/// Read one request head from `stream` within `timeout`
pub async fn read_request<S>(stream: &mut S, timeout: Duration) -> Result<ProxyRequest, HttpError>
where
    S: AsyncRead + Unpin,
{
    let read = async {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(HttpError::Malformed(
                    "connection closed before end of request head".to_string(),
                ));
            }
            if let Some(request) = ProxyRequest::parse(&buf)? {
                return Ok(request);
            }
            if buf.len() >= MAX_HEAD_LEN {
                return Err(HttpError::HeadTooLarge);
            }
        }
    };

    match tokio::time::timeout(timeout, read).await {
        Ok(result) => result,
        Err(_) => Err(HttpError::Timeout),
    }
}
