//! Resolving a request to a key namespace.

use crate::ratelimit::{normalize_token, KeyMode};

/// Address key shared by every request whose client address is unknown.
///
/// Such requests are metered together instead of passing unmetered or
/// failing with an empty key.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// How a single request is metered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Metered against a trimmed caller token
    Token(String),
    /// Metered against a client address; the limiter canonicalizes it
    Ip(String),
    /// Not metered at all
    Disabled,
}

impl Mode {
    /// Pick the mode for a request.
    ///
    /// A non-blank token wins when token limiting is enabled. Otherwise the
    /// client address is used when address limiting is enabled, falling
    /// back to [`UNKNOWN_CLIENT`] when the address is blank.
    pub fn resolve(
        token_enabled: bool,
        ip_enabled: bool,
        token: Option<&str>,
        client_ip: &str,
    ) -> Self {
        if token_enabled {
            if let Some(token) = token.and_then(normalize_token) {
                return Mode::Token(token.to_string());
            }
        }
        if ip_enabled {
            let ip = client_ip.trim();
            if ip.is_empty() {
                return Mode::Ip(UNKNOWN_CLIENT.to_string());
            }
            return Mode::Ip(ip.to_string());
        }
        Mode::Disabled
    }

    /// The key namespace, if the request is metered.
    pub fn key_mode(&self) -> Option<KeyMode> {
        match self {
            Mode::Token(_) => Some(KeyMode::Token),
            Mode::Ip(_) => Some(KeyMode::Ip),
            Mode::Disabled => None,
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Token(_) => "token",
            Mode::Ip(_) => "ip",
            Mode::Disabled => "disabled",
        }
    }
}

/// Determine the client address of a request.
///
/// With `trust_proxy_headers`, the first `X-Forwarded-For` hop wins, then
/// `X-Real-IP`; the peer address is the fallback either way. The selected
/// value is only trimmed; ports and IPv6 forms are left to the limiter.
pub fn client_ip(
    trust_proxy_headers: bool,
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer_addr: &str,
) -> String {
    if trust_proxy_headers {
        let forwarded = forwarded_for
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
        if let Some(ip) = real_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
            return ip.to_string();
        }
    }
    peer_addr.trim().to_string()
}
