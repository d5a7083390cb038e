//! Test utilities for socksrelay
//!
//! Listener helpers, an echo upstream and SOCKS5 byte builders shared by
//! the integration tests.

#![allow(dead_code)]

use socksrelay::config::{HttpConfig, Socks5Config};
use socksrelay::{HttpServer, Socks5Server};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// A local port with nothing listening on it
pub async fn closed_port() -> u16 {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr.port()
}

/// Spawn a TCP echo server, returning its address
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    addr
}

/// Spawn a server that reads one HTTP request head, records it and answers
/// with a fixed response
pub async fn spawn_http_origin(response: &'static [u8]) -> (SocketAddr, tokio::sync::oneshot::Receiver<Vec<u8>>) {
    let (listener, addr) = create_test_listener().await;
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).await.unwrap() == 0 {
                break;
            }
            head.push(byte[0]);
        }
        let _ = tx.send(head);
        stream.write_all(response).await.unwrap();
    });
    (addr, rx)
}

/// Start a SOCKS5 server on an ephemeral port
pub async fn start_socks5_server(config: Socks5Config) -> (Arc<Socks5Server>, SocketAddr) {
    let (listener, addr) = create_test_listener().await;
    let server = Arc::new(Socks5Server::new(&config.normalized()));
    let serving = server.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    (server, addr)
}

/// Start an HTTP proxy on an ephemeral port
pub async fn start_http_server(config: HttpConfig) -> (Arc<HttpServer>, SocketAddr) {
    let (listener, addr) = create_test_listener().await;
    let server = Arc::new(HttpServer::new(&config.normalized()).unwrap());
    let serving = server.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    (server, addr)
}

/// Read exactly `n` bytes
pub async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

/// Raw SOCKS5 request builders
pub mod socks5_mock {
    use socksrelay::socks::consts::*;

    /// Method selection offering only no-auth
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Method selection offering only user/pass
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Username/password sub-negotiation request
    pub fn create_user_pass(user: &str, pass: &str) -> Vec<u8> {
        let mut req = vec![SOCKS5_AUTH_VERSION, user.len() as u8];
        req.extend_from_slice(user.as_bytes());
        req.push(pass.len() as u8);
        req.extend_from_slice(pass.as_bytes());
        req
    }

    /// Request for `cmd` to an IPv4 address
    pub fn create_request_ipv4(cmd: u8, ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut req = vec![SOCKS5_VERSION, cmd, SOCKS5_RESERVED, SOCKS5_ADDR_TYPE_IPV4];
        req.extend_from_slice(&ip);
        req.extend_from_slice(&port.to_be_bytes());
        req
    }

    /// CONNECT to an IPv4 address
    pub fn create_connect_ipv4(ip: [u8; 4], port: u16) -> Vec<u8> {
        create_request_ipv4(SOCKS5_CMD_TCP_CONNECT, ip, port)
    }

    /// CONNECT to a domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut req = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        req.extend_from_slice(domain.as_bytes());
        req.extend_from_slice(&port.to_be_bytes());
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_server() {
        let addr = spawn_echo_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"hello").await.unwrap();
        assert_eq!(read_n(&mut stream, 5).await, b"hello");
    }

    #[test]
    fn test_socks5_mock_user_pass() {
        let req = socks5_mock::create_user_pass("ab", "xyz");
        assert_eq!(req, vec![1, 2, b'a', b'b', 3, b'x', b'y', b'z']);
    }

    #[test]
    fn test_socks5_mock_connect_ipv4() {
        let cmd = socks5_mock::create_connect_ipv4([192, 168, 1, 1], 8080);
        assert_eq!(cmd[0], 5); // SOCKS5 version
        assert_eq!(cmd[1], 1); // CONNECT
        assert_eq!(cmd[3], 1); // IPv4
        assert_eq!(&cmd[4..8], &[192, 168, 1, 1]);
        assert_eq!(&cmd[8..], &8080u16.to_be_bytes());
    }
}
