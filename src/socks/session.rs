//! Per-connection SOCKS5 server state machine
//!
//! Drives one accepted stream through method negotiation, the optional
//! user/pass sub-negotiation, the request and the reply, then hands both
//! ends to the handler's `forward`.

use super::addr::Address;
use super::auth::{read_methods, read_user_pass, write_auth_status, write_method};
use super::command::{read_request, write_reply};
use super::types::{Method, Reply, SocksCommand};
use crate::error::Socks5Error;
use crate::handler::ServerHandler;
use crate::helper::{DEFAULT_READ_TIMEOUT_MS, DEFAULT_WRITE_TIMEOUT_MS};
use crate::relay::RelayOutcome;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Per-phase deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for each read phase
    pub read: Duration,
    /// Deadline for each write
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            read: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            write: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}

/// How a session that completed the protocol ended
#[derive(Debug)]
pub enum SessionEnd {
    /// No offered method was acceptable
    NoAcceptableMethod,
    /// Credentials rejected
    AuthRejected,
    /// A failure reply was sent
    Rejected(Reply),
    /// Relay ran to completion
    Relayed(RelayOutcome),
}

/// Run the SOCKS5 server protocol on `stream`
///
/// # Protocol Flow
///
/// 1. Method negotiation
/// 2. Username/password sub-negotiation (if selected)
/// 3. Request
/// 4. Reply, then relay for a successful CONNECT
///
/// Wire failures come back as `Err`, wrapped with the phase name. Outcomes
/// the protocol itself reports to the peer come back as `Ok`.
pub async fn run_session<S>(
    mut stream: S,
    handler: &dyn ServerHandler,
    timeouts: Timeouts,
) -> Result<SessionEnd, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // Step 1: Method negotiation
    let methods = read_methods(&mut stream, timeouts.read)
        .await
        .map_err(|e| Socks5Error::step("wait handshake", e))?;

    let method = handler.handshake(&methods);
    write_method(&mut stream, method, timeouts.write)
        .await
        .map_err(|e| Socks5Error::step("reply handshake", e))?;

    debug!("Method negotiation completed with method: {}", method);

    if method == Method::NOT_SUPPORTED {
        return Ok(SessionEnd::NoAcceptableMethod);
    }

    // Step 2: Username/password
    if method == Method::USER_PASS {
        let (user, pass) = read_user_pass(&mut stream, timeouts.read)
            .await
            .map_err(|e| Socks5Error::step("wait user/pass", e))?;

        let ok = handler.check_user_pass(&user, &pass).await;
        write_auth_status(&mut stream, ok, timeouts.write)
            .await
            .map_err(|e| Socks5Error::step("reply user/pass", e))?;

        if !ok {
            warn!("SOCKS5 authentication failed for user {:?}", user);
            return Ok(SessionEnd::AuthRejected);
        }
    }

    // Step 3: Request
    let request = match read_request(&mut stream, timeouts.read).await {
        Ok(request) => request,
        Err(err @ Socks5Error::MalformedAddress(_)) => {
            if let Err(e) = write_reply(
                &mut stream,
                Reply::UNSUPPORTED_ADDRESS,
                &Address::Unknown,
                timeouts.write,
            )
            .await
            {
                debug!("reply request failed after {}: {}", err, e);
            }
            return Err(Socks5Error::step("wait request", err));
        }
        Err(err) => return Err(Socks5Error::step("wait request", err)),
    };

    info!("SOCKS5 {} request to {}", request.command, request.target);

    // Step 4: Dispatch
    match request.command {
        SocksCommand::Connect => {}
        other => {
            warn!("SOCKS5 {} command not supported", other);
            write_reply(
                &mut stream,
                Reply::UNSUPPORTED_COMMAND,
                &Address::Unknown,
                timeouts.write,
            )
            .await
            .map_err(|e| Socks5Error::step("reply request", e))?;
            return Ok(SessionEnd::Rejected(Reply::UNSUPPORTED_COMMAND));
        }
    }

    let (remote, bound) = match handler.connect(&request.target).await {
        Ok(connected) => connected,
        Err(e) => {
            let reply = Reply::from_connect_error(&e);
            warn!(
                "Failed to connect to {}: {} (reply: {})",
                request.target, e, reply
            );
            write_reply(&mut stream, reply, &Address::Unknown, timeouts.write)
                .await
                .map_err(|e| Socks5Error::step("reply request", e))?;
            return Ok(SessionEnd::Rejected(reply));
        }
    };

    write_reply(&mut stream, Reply::OK, &bound, timeouts.write)
        .await
        .map_err(|e| Socks5Error::step("reply request", e))?;

    info!("SOCKS5 tunnel established to {}", request.target);

    // Step 5: Relay
    let outcome = handler.forward(Box::new(stream), remote).await;
    Ok(SessionEnd::Relayed(outcome))
}
