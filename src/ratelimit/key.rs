//! Key namespaces and key normalization.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// The namespace a key belongs to.
///
/// Each mode is backed by its own store, so a token and an address with the
/// same spelling never share counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    /// Caller-supplied token such as an API key
    Token,
    /// Client network address
    Ip,
}

impl KeyMode {
    /// Short lowercase name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyMode::Token => "token",
            KeyMode::Ip => "ip",
        }
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trim a raw token, returning `None` when nothing is left.
pub fn normalize_token(raw: &str) -> Option<&str> {
    let token = raw.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Canonicalize a client address into a key.
///
/// Ports and IPv6 brackets are stripped, IPv6 is rendered in its compressed
/// lowercase form and IPv4-mapped IPv6 addresses collapse to plain IPv4.
/// Input that is not an address at all is kept, trimmed and lowercased, so
/// the caller still gets a stable key. The result is empty only when the
/// input is blank.
pub fn canonical_ip(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        return addr.ip().to_canonical().to_string();
    }

    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    match unbracketed.parse::<IpAddr>() {
        Ok(ip) => ip.to_canonical().to_string(),
        Err(_) if unbracketed.is_empty() => trimmed.to_string(),
        Err(_) => unbracketed.to_ascii_lowercase(),
    }
}
