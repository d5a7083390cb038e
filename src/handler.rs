//! Server handler capability set
//!
//! Every policy decision the SOCKS5 and HTTP servers make is delegated to a
//! [`ServerHandler`]: which auth method to select, whether credentials are
//! valid, how to reach the upstream target and how to move bytes once
//! connected. [`DefaultHandler`] is the stock implementation.

use crate::relay::{relay, RelayOutcome};
use crate::socks::addr::Address;
use crate::socks::types::Method;
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A duplex byte stream usable as either end of a relay
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProxyStream for T {}

/// Boxed [`ProxyStream`]
pub type BoxStream = Box<dyn ProxyStream>;

/// Pluggable server behaviour
#[async_trait]
pub trait ServerHandler: Send + Sync {
    /// Pick one of the client's offered methods, or [`Method::NOT_SUPPORTED`]
    fn handshake(&self, methods: &[Method]) -> Method;

    /// Validate a username/password pair
    async fn check_user_pass(&self, user: &str, pass: &str) -> bool;

    /// Open a stream to `target`, returning it with the address to report
    /// back to the client as bound
    async fn connect(&self, target: &Address) -> io::Result<(BoxStream, Address)>;

    /// Move bytes between the client and upstream streams until both
    /// directions stop
    async fn forward(&self, local: BoxStream, remote: BoxStream) -> RelayOutcome {
        relay(local, remote).await
    }
}

/// Stock handler: optional credential policy and a direct TCP dialer
#[derive(Debug, Clone)]
pub struct DefaultHandler {
    credentials: Option<(String, String)>,
    auth_required: bool,
    connect_timeout: Duration,
}

impl Default for DefaultHandler {
    fn default() -> Self {
        DefaultHandler {
            credentials: None,
            auth_required: false,
            connect_timeout: Duration::from_millis(crate::helper::DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl DefaultHandler {
    /// Handler that selects no-auth and accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only this username/password pair
    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), pass.into()));
        self
    }

    /// Insist on user/pass even when the client offers no-auth
    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    /// Upstream dial timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check if credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}

#[async_trait]
impl ServerHandler for DefaultHandler {
    fn handshake(&self, methods: &[Method]) -> Method {
        let offered = |m: Method| methods.contains(&m);

        if self.auth_required {
            if offered(Method::USER_PASS) {
                return Method::USER_PASS;
            }
        } else {
            if offered(Method::NO_AUTH) {
                return Method::NO_AUTH;
            }
            if offered(Method::USER_PASS) && self.has_credentials() {
                return Method::USER_PASS;
            }
        }

        Method::NOT_SUPPORTED
    }

    async fn check_user_pass(&self, user: &str, pass: &str) -> bool {
        match &self.credentials {
            Some((expected_user, expected_pass)) => user == expected_user && pass == expected_pass,
            None => true,
        }
    }

    async fn connect(&self, target: &Address) -> io::Result<(BoxStream, Address)> {
        let candidates = target.resolve().await?;
        let mut last_err = None;

        for addr in candidates {
            debug!("Connecting to target: {}", addr);
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let bound = stream.peer_addr().unwrap_or(addr);
                    return Ok((Box::new(stream), Address::Ip(bound)));
                }
                Ok(Err(e)) => last_err = Some(e),
                Err(_) => {
                    last_err = Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", addr),
                    ))
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", target),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::types::Reply;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_handshake_prefers_no_auth() {
        let handler = DefaultHandler::new();
        assert_eq!(
            handler.handshake(&[Method::USER_PASS, Method::NO_AUTH]),
            Method::NO_AUTH
        );
        assert_eq!(handler.handshake(&[Method::NO_AUTH]), Method::NO_AUTH);
    }

    #[test]
    fn test_handshake_no_supported_method() {
        let handler = DefaultHandler::new();
        assert_eq!(handler.handshake(&[Method::GSSAPI]), Method::NOT_SUPPORTED);
        assert_eq!(handler.handshake(&[]), Method::NOT_SUPPORTED);
        // user/pass without configured credentials is not selected
        assert_eq!(handler.handshake(&[Method::USER_PASS]), Method::NOT_SUPPORTED);
    }

    #[test]
    fn test_handshake_auth_required() {
        let handler = DefaultHandler::new()
            .with_credentials("user", "pass")
            .auth_required(true);
        assert_eq!(
            handler.handshake(&[Method::NO_AUTH, Method::USER_PASS]),
            Method::USER_PASS
        );
        assert_eq!(handler.handshake(&[Method::NO_AUTH]), Method::NOT_SUPPORTED);
    }

    #[test]
    fn test_handshake_user_pass_fallback() {
        let handler = DefaultHandler::new().with_credentials("user", "pass");
        assert_eq!(handler.handshake(&[Method::USER_PASS]), Method::USER_PASS);
    }

    #[tokio::test]
    async fn test_check_user_pass() {
        assert!(DefaultHandler::new().check_user_pass("any", "thing").await);

        let handler = DefaultHandler::new().with_credentials("user", "pass");
        assert!(handler.check_user_pass("user", "pass").await);
        assert!(!handler.check_user_pass("user", "wrong").await);
        assert!(!handler.check_user_pass("other", "pass").await);
    }

    #[tokio::test]
    async fn test_connect_reports_peer_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"hi").await.unwrap();
        });

        let handler = DefaultHandler::new();
        let (mut stream, bound) = handler
            .connect(&Address::ipv4(Ipv4Addr::LOCALHOST, addr.port()))
            .await
            .unwrap();
        assert_eq!(bound, Address::Ip(addr));

        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let handler = DefaultHandler::new();
        let err = match handler
            .connect(&Address::ipv4(Ipv4Addr::LOCALHOST, port))
            .await
        {
            Ok(_) => panic!("connect to closed port succeeded"),
            Err(e) => e,
        };
        assert_eq!(Reply::from_connect_error(&err), Reply::CONNECTION_REFUSED);
    }

    #[tokio::test]
    async fn test_connect_unknown_address() {
        let handler = DefaultHandler::new();
        assert!(handler.connect(&Address::Unknown).await.is_err());
    }
}
