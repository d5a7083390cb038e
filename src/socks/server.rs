//! SOCKS5 server accept loop

use super::session::{run_session, SessionEnd, Timeouts};
use crate::config::Socks5Config;
use crate::error::ProxyError;
use crate::handler::ServerHandler;
use crate::helper::ACCEPT_ERROR_BACKOFF;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// SOCKS5 server
///
/// One task per accepted connection. [`Socks5Server::shutdown`] stops the
/// accept loop and closes the listener; sessions already running are left
/// to finish on their own.
pub struct Socks5Server {
    handler: Arc<dyn ServerHandler>,
    timeouts: Timeouts,
    shutdown: CancellationToken,
}

impl Socks5Server {
    /// Server using the default handler built from `config`
    pub fn new(config: &Socks5Config) -> Self {
        Self::with_handler(config.timeouts(), Arc::new(config.handler()))
    }

    /// Server using a caller-supplied handler
    pub fn with_handler(timeouts: Timeouts, handler: Arc<dyn ServerHandler>) -> Self {
        Socks5Server {
            handler,
            timeouts,
            shutdown: CancellationToken::new(),
        }
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
    pub async fn listen_and_serve<A: ToSocketAddrs>(&self, addr: A) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ProxyError> {
        info!("SOCKS5 server listening on {}", listener.local_addr()?);

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted SOCKS5 connection from {}", peer);
                    let _ = stream.set_nodelay(true);
                    let handler = self.handler.clone();
                    let timeouts = self.timeouts;
                    tokio::spawn(async move {
                        serve_connection(stream, peer, handler.as_ref(), timeouts).await;
                    });
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        info!("SOCKS5 server stopped");
        Ok(())
    }

    /// Run the protocol on one already accepted stream
    pub async fn handle_connection<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        serve_connection(stream, peer, self.handler.as_ref(), self.timeouts).await;
    }
}

async fn serve_connection<S>(stream: S, peer: SocketAddr, handler: &dyn ServerHandler, timeouts: Timeouts)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match run_session(stream, handler, timeouts).await {
        Ok(SessionEnd::Relayed(outcome)) => {
            debug!("SOCKS5 session finished; addr={}, relay={:?}", peer, outcome)
        }
        Ok(end) => debug!("SOCKS5 session ended; addr={}, end={:?}", peer, end),
        Err(e) => error!("SOCKS5 session failed; addr={}, err={}", peer, e),
    }
}
