//! SOCKS5 client
//!
//! Opens a TCP connection to the proxy, negotiates, issues CONNECT and
//! returns the stream ready for application data. Each step has its own
//! deadline and failures are labelled with the step that produced them.

use super::addr::Address;
use super::auth::write_all;
use super::consts::*;
use super::types::{Method, Reply, SocksCommand};
use crate::config::ClientConfig;
use crate::error::Socks5Error;
use crate::helper::deadline;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// SOCKS5 client bound to one proxy address
#[derive(Debug, Clone)]
pub struct Socks5Client {
    config: ClientConfig,
}

impl Socks5Client {
    /// Create a client for the proxy in `config`
    pub fn new(config: ClientConfig) -> Self {
        Socks5Client { config }
    }

    /// Proxy address this client dials
    pub fn server_addr(&self) -> &str {
        &self.config.server_addr
    }

    /// Tunnel to `target` ("host:port") without authentication
    pub async fn dial(&self, target: &str) -> Result<TcpStream, Socks5Error> {
        self.dial_with_credentials(target, "", "").await
    }

    /// Tunnel to `target` ("host:port"), authenticating with user/pass when
    /// either is non-empty
    pub async fn dial_with_credentials(
        &self,
        target: &str,
        user: &str,
        pass: &str,
    ) -> Result<TcpStream, Socks5Error> {
        let target: Address = target
            .parse()
            .map_err(|e| Socks5Error::step("request", e))?;

        let mut stream = deadline(
            self.config.connect_timeout(),
            "connect",
            TcpStream::connect(self.config.server_addr.as_str()),
        )
        .await
        .map_err(|e| Socks5Error::step("connect", e))?;
        let _ = stream.set_nodelay(true);

        let credentials = if user.is_empty() && pass.is_empty() {
            None
        } else {
            Some((user, pass))
        };

        let bound = negotiate(
            &mut stream,
            &target,
            credentials,
            self.config.read_timeout(),
            self.config.write_timeout(),
        )
        .await?;

        debug!(
            "SOCKS5 tunnel to {} via {} established, bound {}",
            target, self.config.server_addr, bound
        );
        Ok(stream)
    }
}

/// Run the client side of the protocol over an already connected stream
///
/// Returns the bound address the server reported. On error the caller is
/// expected to drop the stream.
pub async fn negotiate<S>(
    stream: &mut S,
    target: &Address,
    credentials: Option<(&str, &str)>,
    read_timeout: Duration,
    write_timeout: Duration,
) -> Result<Address, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let want = if credentials.is_some() {
        Method::USER_PASS
    } else {
        Method::NO_AUTH
    };

    write_all(stream, &[SOCKS5_VERSION, 1, want.0], write_timeout, "handshake")
        .await
        .map_err(|e| Socks5Error::step("handshake", e))?;

    let method = read_method(stream, read_timeout)
        .await
        .map_err(|e| Socks5Error::step("wait handshake", e))?;
    if method != want {
        return Err(Socks5Error::Method {
            expected: want,
            actual: method,
        });
    }

    if let Some((user, pass)) = credentials {
        authenticate(stream, user, pass, read_timeout, write_timeout)
            .await
            .map_err(|e| Socks5Error::step("handshake user/pass", e))?;
    }

    request(stream, target, read_timeout, write_timeout)
        .await
        .map_err(|e| Socks5Error::step("request", e))
}

async fn read_method<S>(stream: &mut S, timeout: Duration) -> Result<Method, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    deadline(timeout, "wait handshake", async {
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await?;
        if buf[0] != SOCKS5_VERSION {
            return Err(Socks5Error::Version(buf[0]));
        }
        Ok::<_, Socks5Error>(Method(buf[1]))
    })
    .await
}

/// Cut a credential to what fits behind a one byte length
fn truncate_credential(value: &str) -> &[u8] {
    let bytes = value.as_bytes();
    &bytes[..bytes.len().min(MAX_CREDENTIAL_LEN)]
}

async fn authenticate<S>(
    stream: &mut S,
    user: &str,
    pass: &str,
    read_timeout: Duration,
    write_timeout: Duration,
) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let user = truncate_credential(user);
    let pass = truncate_credential(pass);

    let mut buf = Vec::with_capacity(3 + user.len() + pass.len());
    buf.push(SOCKS5_AUTH_VERSION);
    buf.push(user.len() as u8);
    buf.extend_from_slice(user);
    buf.push(pass.len() as u8);
    buf.extend_from_slice(pass);
    write_all(stream, &buf, write_timeout, "send user/pass").await?;

    let reply = deadline(read_timeout, "wait user/pass", async {
        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await?;
        Ok::<_, std::io::Error>(reply)
    })
    .await?;

    if reply[0] != SOCKS5_AUTH_VERSION {
        return Err(Socks5Error::AuthVersion(reply[0]));
    }
    if reply[1] != SOCKS5_AUTH_SUCCESS {
        return Err(Socks5Error::AuthFailed);
    }
    Ok(())
}

async fn request<S>(
    stream: &mut S,
    target: &Address,
    read_timeout: Duration,
    write_timeout: Duration,
) -> Result<Address, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![SOCKS5_VERSION, SocksCommand::Connect.to_byte(), SOCKS5_RESERVED];
    buf.extend_from_slice(&target.to_bytes());
    write_all(stream, &buf, write_timeout, "send connect").await?;

    deadline(read_timeout, "read response", async {
        let mut header = [0u8; 3];
        stream.read_exact(&mut header).await?;

        if header[0] != SOCKS5_VERSION {
            return Err(Socks5Error::Version(header[0]));
        }
        let reply = Reply(header[1]);
        if !reply.is_success() {
            return Err(Socks5Error::step("connect", Socks5Error::Reply(reply)));
        }

        // bound address: consumed to advance the stream
        Ok::<_, Socks5Error>(Address::read_from(stream).await?)
    })
    .await
}
