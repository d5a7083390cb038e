//! Bidirectional relay engine
//!
//! Two copy loops share one cancellation token. Whichever loop stops first
//! (EOF, read error or write error) cancels the token and shuts down its
//! write side; the other loop notices the token the next time it comes
//! around, or ends on its own when the peer reacts to the shutdown. An
//! in-flight read is never interrupted.

use crate::socks::consts::RELAY_BUFFER_SIZE;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of both relay directions
#[derive(Debug)]
pub struct RelayOutcome {
    /// Bytes copied from A to B, or the error that stopped that direction
    pub a_to_b: io::Result<u64>,
    /// Bytes copied from B to A, or the error that stopped that direction
    pub b_to_a: io::Result<u64>,
}

impl RelayOutcome {
    /// Whether either direction stopped on an I/O error
    pub fn is_err(&self) -> bool {
        self.a_to_b.is_err() || self.b_to_a.is_err()
    }
}

/// Relay bytes between `a` and `b` until both directions have stopped.
///
/// A→B runs on a spawned task, B→A on the caller's task.
pub async fn relay<A, B>(a: A, b: B) -> RelayOutcome
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let token = CancellationToken::new();

    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    let forward = tokio::spawn(copy_loop(a_read, b_write, token.clone()));
    let b_to_a = copy_loop(b_read, a_write, token).await;

    let a_to_b = match forward.await {
        Ok(result) => result,
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    };

    match (&a_to_b, &b_to_a) {
        (Ok(up), Ok(down)) => debug!("relay finished: {} bytes A->B, {} bytes B->A", up, down),
        _ => debug!("relay finished: A->B {:?}, B->A {:?}", a_to_b, b_to_a),
    }

    RelayOutcome { a_to_b, b_to_a }
}

/// Copy `src` into `dst` through a fixed buffer until EOF, error or
/// cancellation. Always cancels `token` on the way out.
pub async fn copy_loop<R, W>(mut src: R, mut dst: W, token: CancellationToken) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut written = 0u64;

    let result = loop {
        if token.is_cancelled() {
            break Ok(written);
        }

        let n = match src.read(&mut buf).await {
            Ok(0) => break Ok(written),
            Ok(n) => n,
            Err(e) => break Err(e),
        };

        // write_all reports a short write as WriteZero
        if let Err(e) = dst.write_all(&buf[..n]).await {
            break Err(e);
        }
        if let Err(e) = dst.flush().await {
            break Err(e);
        }
        written += n as u64;
    };

    token.cancel();
    let _ = dst.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (mut client, relay_a) = duplex(1024);
        let (relay_b, mut upstream) = duplex(1024);

        let handle = tokio::spawn(relay(relay_a, relay_b));

        client.write_all(b"hello from a").await.unwrap();
        let mut buf = [0u8; 12];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello from a");

        upstream.write_all(b"hello from b").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello from b");

        drop(client);
        drop(upstream);

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.a_to_b.unwrap(), 12);
        assert_eq!(outcome.b_to_a.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_relay_eof_propagates_shutdown() {
        let (mut client, relay_a) = duplex(1024);
        let (relay_b, mut upstream) = duplex(1024);

        let handle = tokio::spawn(relay(relay_a, relay_b));

        client.write_all(b"ping").await.unwrap();
        client.shutdown().await.unwrap();

        // upstream sees the data then EOF, and closes its side in turn
        let mut received = Vec::new();
        upstream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"ping");
        drop(upstream);

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.is_err());
    }

    #[tokio::test]
    async fn test_relay_large_payload() {
        let (mut client, relay_a) = duplex(65536);
        let (relay_b, mut upstream) = duplex(65536);

        let handle = tokio::spawn(relay(relay_a, relay_b));

        let payload = vec![0xAB; 100_000];
        let writer = {
            let payload = payload.clone();
            tokio::spawn(async move {
                client.write_all(&payload).await.unwrap();
                client
            })
        };

        let mut received = vec![0u8; payload.len()];
        upstream.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);

        drop(writer.await.unwrap());
        drop(upstream);
        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.a_to_b.unwrap(), 100_000);
    }

    #[tokio::test]
    async fn test_copy_loop_stops_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let (src, _keep) = duplex(64);
        let (dst, _peer) = duplex(64);
        let written = copy_loop(src, dst, token).await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_copy_loop_cancels_token_on_eof() {
        let token = CancellationToken::new();
        let (src, writer) = duplex(64);
        drop(writer);
        let (dst, _peer) = duplex(64);

        copy_loop(src, dst, token.clone()).await.unwrap();
        assert!(token.is_cancelled());
    }
}
