//! SOCKS5 request parsing and reply building

use super::addr::Address;
use super::auth::write_all;
use super::consts::*;
use super::types::{Reply, SocksCommand};
use crate::error::Socks5Error;
use crate::helper::deadline;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Requested command
    pub command: SocksCommand,
    /// Destination address
    pub target: Address,
}

/// Read a SOCKS5 request
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Unassigned command bytes are kept as [`SocksCommand::Unknown`].
pub async fn read_request<S>(stream: &mut S, timeout: Duration) -> Result<Request, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    deadline(timeout, "wait request", async {
        let mut header = [0u8; 3];
        stream.read_exact(&mut header).await?;

        if header[0] != SOCKS5_VERSION {
            return Err(Socks5Error::Version(header[0]));
        }

        let command = SocksCommand::from_byte(header[1]);
        let target = Address::read_from(stream).await?;

        tracing::debug!("Parsed SOCKS5 command: {} to {}", command, target);

        Ok::<_, Socks5Error>(Request { command, target })
    })
    .await
}

/// Build `[5, reply, 0, bound address]`
pub fn build_reply(reply: Reply, bound: &Address) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(3 + bound.encoded_len());
    bytes.push(SOCKS5_VERSION);
    bytes.push(reply.0);
    bytes.push(SOCKS5_RESERVED);
    bytes.extend_from_slice(&bound.to_bytes());
    bytes
}

/// Write a reply under the write deadline
pub async fn write_reply<S>(
    stream: &mut S,
    reply: Reply,
    bound: &Address,
    timeout: Duration,
) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    write_all(stream, &build_reply(reply, bound), timeout, "reply request").await
}
