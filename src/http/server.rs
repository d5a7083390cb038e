//! HTTP proxy front-end server
//!
//! Accepts `CONNECT host:port` and absolute-URI proxy requests, dials the
//! target through the [`ServerHandler`] and hands both streams to the relay.

use super::auth::{check_request, AuthDecision};
use super::request::{read_request, ProxyRequest};
use crate::config::HttpConfig;
use crate::error::{HttpError, ProxyError};
use crate::handler::{BoxStream, ServerHandler};
use crate::helper::ACCEPT_ERROR_BACKOFF;
use crate::relay::RelayOutcome;
use crate::socks::types::Reply;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(feature = "rustls-tls")]
use tokio_rustls::TlsAcceptor;

/// Status line written on a successful CONNECT
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";

const PROXY_AUTH_REALM: &str = "Basic realm=\"socksrelay\"";

/// How a proxied connection ended
#[derive(Debug)]
pub enum HttpSessionEnd {
    /// An error status was sent and the connection closed
    Refused(u16),
    /// Target connected and bytes were relayed
    Relayed(RelayOutcome),
}

/// HTTP proxy server
pub struct HttpServer {
    handler: Arc<dyn ServerHandler>,
    read_timeout: Duration,
    write_timeout: Duration,
    check: bool,
    #[cfg(feature = "rustls-tls")]
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
}

impl HttpServer {
    /// Server using the default handler built from `config`
    pub fn new(config: &HttpConfig) -> Result<Self, ProxyError> {
        Self::with_handler(config, Arc::new(config.handler()))
    }

    /// Server using a caller-supplied handler. Loads the TLS certificate and
    /// key when `config` names them.
    pub fn with_handler(
        config: &HttpConfig,
        handler: Arc<dyn ServerHandler>,
    ) -> Result<Self, ProxyError> {
        #[cfg(feature = "rustls-tls")]
        let tls = match (&config.tls_cert, &config.tls_key) {
            (Some(cert), Some(key)) => Some(super::tls::load_tls_acceptor(cert, key)?),
            _ => None,
        };

        #[cfg(not(feature = "rustls-tls"))]
        if config.tls_enabled() {
            return Err(ProxyError::Config(
                "tls_cert/tls_key set but built without the rustls-tls feature".to_string(),
            ));
        }

        Ok(HttpServer {
            handler,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            check: config.check,
            #[cfg(feature = "rustls-tls")]
            tls,
            shutdown: CancellationToken::new(),
        })
    }

    /// Stop accepting connections. Safe to call any number of times.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Bind `addr` and serve until shutdown
    pub async fn listen_and_serve<A: ToSocketAddrs>(self: &Arc<Self>, addr: A) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), ProxyError> {
        info!(
            "HTTP proxy listening on {}{}",
            listener.local_addr()?,
            if self.tls_enabled() { " (tls)" } else { "" }
        );

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted HTTP connection from {}", peer);
                    let _ = stream.set_nodelay(true);
                    let server = self.clone();
                    tokio::spawn(async move { server.accept_stream(stream, peer).await });
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        info!("HTTP proxy stopped");
        Ok(())
    }

    fn tls_enabled(&self) -> bool {
        #[cfg(feature = "rustls-tls")]
        return self.tls.is_some();
        #[cfg(not(feature = "rustls-tls"))]
        return false;
    }

    #[cfg(feature = "rustls-tls")]
    async fn accept_stream(&self, stream: TcpStream, peer: SocketAddr) {
        let Some(acceptor) = &self.tls else {
            return self.handle_connection(stream, peer).await;
        };

        match tokio::time::timeout(self.read_timeout, acceptor.accept(stream)).await {
            Ok(Ok(stream)) => self.handle_connection(stream, peer).await,
            Ok(Err(e)) => warn!("TLS handshake failed; addr={}, err={}", peer, e),
            Err(_) => warn!("TLS handshake timed out; addr={}", peer),
        }
    }

    #[cfg(not(feature = "rustls-tls"))]
    async fn accept_stream(&self, stream: TcpStream, peer: SocketAddr) {
        self.handle_connection(stream, peer).await
    }

    /// Serve one already accepted (and, for TLS, already decrypted) stream
    pub async fn handle_connection<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        match self.run(stream).await {
            Ok(HttpSessionEnd::Relayed(outcome)) => {
                debug!("HTTP session finished; addr={}, relay={:?}", peer, outcome)
            }
            Ok(HttpSessionEnd::Refused(status)) => {
                debug!("HTTP session refused; addr={}, status={}", peer, status)
            }
            Err(e) => error!("HTTP session failed; addr={}, err={}", peer, e),
        }
    }

    async fn run<S>(&self, mut stream: S) -> Result<HttpSessionEnd, HttpError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let request = match read_request(&mut stream, self.read_timeout).await {
            Ok(request) => request,
            Err(e) if e.is_bad_request() => {
                debug!("Bad proxy request: {}", e);
                return self.refuse(&mut stream, 400, &e.to_string()).await;
            }
            Err(e) => return Err(e),
        };
        debug!("HTTP proxy request: {} {}", request.method, request.target);

        if self.check {
            match check_request(&request, self.handler.as_ref()).await {
                AuthDecision::Granted => {}
                AuthDecision::Missing => return self.refuse(&mut stream, 407, "forbidden").await,
                AuthDecision::Rejected => {
                    warn!("Invalid proxy credentials for {}", request.target);
                    return self.refuse(&mut stream, 401, "invalid user/pass").await;
                }
            }
        }

        let target = match request.target_address() {
            Ok(target) => target,
            Err(e) => return self.refuse(&mut stream, 400, &e.to_string()).await,
        };

        let mut remote = match self.handler.connect(&target).await {
            Ok((remote, _bound)) => remote,
            Err(e) => {
                warn!(
                    "Connect to {} failed: {} ({})",
                    target,
                    e,
                    Reply::from_connect_error(&e)
                );
                return self.refuse(&mut stream, 502, &e.to_string()).await;
            }
        };

        self.open_tunnel(&mut stream, &mut remote, &request).await?;

        let outcome = self.handler.forward(Box::new(stream), remote).await;
        Ok(HttpSessionEnd::Relayed(outcome))
    }

    /// Send what has to precede the relay: the 200 status to the client for
    /// CONNECT, the re-serialized request to the target otherwise
    async fn open_tunnel<S>(
        &self,
        stream: &mut S,
        remote: &mut BoxStream,
        request: &ProxyRequest,
    ) -> Result<(), HttpError>
    where
        S: AsyncWrite + Unpin,
    {
        if request.is_connect() {
            write_timed(stream, CONNECT_ESTABLISHED, self.write_timeout).await?;
            if !request.rest.is_empty() {
                write_timed(remote, &request.rest, self.write_timeout).await?;
            }
        } else {
            write_timed(remote, &request.to_upstream_bytes(), self.write_timeout).await?;
        }
        Ok(())
    }

    async fn refuse<S>(
        &self,
        stream: &mut S,
        status: u16,
        msg: &str,
    ) -> Result<HttpSessionEnd, HttpError>
    where
        S: AsyncWrite + Unpin,
    {
        write_timed(stream, &error_response(status, msg), self.write_timeout).await?;
        let _ = stream.shutdown().await;
        Ok(HttpSessionEnd::Refused(status))
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        407 => "Proxy Authentication Required",
        502 => "Bad Gateway",
        _ => "Error",
    }
}

/// Plain-text error response; the connection closes after it
pub fn error_response(status: u16, msg: &str) -> Vec<u8> {
    let body = format!("{}\n", msg);
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         X-Content-Type-Options: nosniff\r\n",
        status,
        reason_phrase(status)
    );
    if status == 407 {
        head.push_str(&format!("Proxy-Authenticate: {}\r\n", PROXY_AUTH_REALM));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));

    let mut out = head.into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

async fn write_timed<S>(stream: &mut S, data: &[u8], timeout: Duration) -> Result<(), HttpError>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        stream.write_all(data).await?;
        stream.flush().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn server(config: HttpConfig) -> HttpServer {
        HttpServer::new(&config.normalized()).unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn exchange(server: &HttpServer, request: &[u8]) -> String {
        let (near, mut far) = tokio::io::duplex(4096);
        far.write_all(request).await.unwrap();
        server.handle_connection(near, peer()).await;

        let mut buf = Vec::new();
        far.read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn checked() -> HttpConfig {
        HttpConfig {
            check: true,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_error_response_format() {
        let resp = String::from_utf8(error_response(401, "invalid user/pass")).unwrap();
        assert!(resp.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(resp.contains("Content-Length: 18\r\n"));
        assert!(resp.ends_with("\r\n\r\ninvalid user/pass\n"));
        assert!(!resp.contains("Proxy-Authenticate"));

        let resp = String::from_utf8(error_response(407, "forbidden")).unwrap();
        assert!(resp.contains("Proxy-Authenticate: Basic realm=\"socksrelay\"\r\n"));
    }

    #[tokio::test]
    async fn test_bad_request() {
        let resp = exchange(&server(HttpConfig::default()), b"\x16\x03\x01 garbage\r\n\r\n").await;
        assert!(resp.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let resp = exchange(&server(checked()), b"CONNECT example.com:443 HTTP/1.1\r\n\r\n").await;
        assert!(resp.starts_with("HTTP/1.1 407 Proxy Authentication Required\r\n"));
        assert!(resp.ends_with("forbidden\n"));
    }

    #[tokio::test]
    async fn test_wrong_credentials() {
        // user:wrong
        let resp = exchange(
            &server(checked()),
            b"CONNECT example.com:443 HTTP/1.1\r\nProxy-Authenticate: Basic dXNlcjp3cm9uZw==\r\n\r\n",
        )
        .await;
        assert!(resp.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(resp.ends_with("invalid user/pass\n"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", port);
        let resp = exchange(&server(HttpConfig::default()), request.as_bytes()).await;
        assert!(resp.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
    }

    #[tokio::test]
    async fn test_connect_tunnel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut upstream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            upstream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            upstream.write_all(b"pong").await.unwrap();
        });

        let server = server(checked());
        let (near, mut far) = tokio::io::duplex(4096);
        let task = tokio::spawn(async move { server.handle_connection(near, peer()).await });

        let request = format!(
            "CONNECT {} HTTP/1.1\r\nProxy-Authorization: Basic dXNlcjpwYXNz\r\n\r\n",
            addr
        );
        far.write_all(request.as_bytes()).await.unwrap();

        let mut status = vec![0u8; CONNECT_ESTABLISHED.len()];
        far.read_exact(&mut status).await.unwrap();
        assert_eq!(status, CONNECT_ESTABLISHED);

        far.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(far);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let server = Arc::new(server(HttpConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };

        server.shutdown();
        server.shutdown();
        assert!(server.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
