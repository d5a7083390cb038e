//! Basic proxy authentication

use super::request::ProxyRequest;
use crate::handler::ServerHandler;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Headers checked for credentials, in order
const AUTH_HEADERS: [&str; 2] = ["proxy-authenticate", "proxy-authorization"];

/// Result of checking a request's proxy credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Credentials present and accepted
    Granted,
    /// No usable credentials; answer 407
    Missing,
    /// Credentials present but rejected; answer 401
    Rejected,
}

/// Decode a `Basic <base64(user:pass)>` header value. The scheme is
/// matched case-insensitively and the password may contain `:`.
pub fn parse_basic_auth(value: &str) -> Option<(String, String)> {
    const PREFIX: &str = "Basic ";

    let scheme = value.get(..PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    let decoded = STANDARD.decode(value[PREFIX.len()..].trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Check the request's Basic credentials with the handler
pub async fn check_request(request: &ProxyRequest, handler: &dyn ServerHandler) -> AuthDecision {
    let credentials = AUTH_HEADERS
        .iter()
        .filter_map(|name| request.header(name))
        .find(|value| !value.is_empty())
        .and_then(parse_basic_auth);

    match credentials {
        None => AuthDecision::Missing,
        Some((user, pass)) if handler.check_user_pass(&user, &pass).await => AuthDecision::Granted,
        Some(_) => AuthDecision::Rejected,
    }
}
