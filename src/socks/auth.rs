//! Method negotiation and username/password sub-negotiation
//!
//! Server side of the first two SOCKS5 phases. Each function applies its own
//! deadline, so every phase gets a fresh window.

use super::consts::*;
use super::types::Method;
use crate::error::Socks5Error;
use crate::helper::deadline;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read the client's method offer
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub async fn read_methods<S>(stream: &mut S, timeout: Duration) -> Result<Vec<Method>, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    deadline(timeout, "wait handshake", async {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await?;

        if header[0] != SOCKS5_VERSION {
            return Err(Socks5Error::Version(header[0]));
        }

        let mut methods = vec![0u8; header[1] as usize];
        stream.read_exact(&mut methods).await?;

        Ok::<_, Socks5Error>(methods.into_iter().map(Method).collect())
    })
    .await
}

/// Write `[5, method]`
pub async fn write_method<S>(stream: &mut S, method: Method, timeout: Duration) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    write_all(stream, &[SOCKS5_VERSION, method.0], timeout, "reply handshake").await
}

/// Read an RFC 1929 username/password request
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
pub async fn read_user_pass<S>(stream: &mut S, timeout: Duration) -> Result<(String, String), Socks5Error>
where
    S: AsyncRead + Unpin,
{
    deadline(timeout, "wait user/pass", async {
        let version = stream.read_u8().await?;
        if version != SOCKS5_AUTH_VERSION {
            return Err(Socks5Error::AuthVersion(version));
        }

        let user = read_field(stream).await?;
        let pass = read_field(stream).await?;

        Ok::<_, Socks5Error>((user, pass))
    })
    .await
}

/// Write `[1, 0]` on success or `[1, 1]` on failure
pub async fn write_auth_status<S>(stream: &mut S, ok: bool, timeout: Duration) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    let status = if ok {
        SOCKS5_AUTH_SUCCESS
    } else {
        SOCKS5_AUTH_FAILURE
    };
    write_all(stream, &[SOCKS5_AUTH_VERSION, status], timeout, "reply user/pass").await
}

/// Length-prefixed credential field
async fn read_field<S>(stream: &mut S) -> std::io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u8().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write and flush `data` under a deadline
pub(crate) async fn write_all<S>(
    stream: &mut S,
    data: &[u8],
    timeout: Duration,
    phase: &'static str,
) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    deadline(timeout, phase, async {
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok::<_, std::io::Error>(())
    })
    .await
}
