//! Helper utilities for socksrelay
//!
//! Phase deadlines, host:port splitting and shared defaults.

use crate::error::Socks5Error;
use std::future::Future;
use std::time::Duration;

/// Default per-phase read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Default per-phase write timeout in milliseconds
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Default upstream connection timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Pause after a failed accept before trying again
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Run `fut` under a deadline, mapping expiry to [`Socks5Error::Timeout`]
/// labelled with `phase`.
pub async fn deadline<F, T, E>(timeout: Duration, phase: &'static str, fut: F) -> Result<T, Socks5Error>
where
    F: Future<Output = Result<T, E>>,
    E: Into<Socks5Error>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(Socks5Error::Timeout(phase)),
    }
}

/// Milliseconds to a Duration, substituting `default` for zero
pub fn duration_from_millis(ms: u64, default: u64) -> Duration {
    Duration::from_millis(if ms == 0 { default } else { ms })
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
///
/// The port is `None` when absent or empty. Brackets are removed from the
/// returned host.
pub fn split_host_port(s: &str) -> Option<(&str, Option<u16>)> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return match tail {
            "" | ":" => Some((host, None)),
            _ => {
                let port = tail.strip_prefix(':')?;
                Some((host, Some(port.parse().ok()?)))
            }
        };
    }

    match s.rsplit_once(':') {
        // bare IPv6 without brackets has no port
        Some((host, _)) if host.contains(':') => Some((s, None)),
        Some((host, "")) => Some((host, None)),
        Some((host, port)) => Some((host, Some(port.parse().ok()?))),
        None => Some((s, None)),
    }
}
