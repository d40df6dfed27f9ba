//! Upstream address translation.
//!
//! The upstream base is configured as an HTTP URL (the same base the HTTP
//! collaborators post to). The relay endpoint lives on the same host under a
//! fixed path and speaks WebSocket, so the scheme is mapped before dialing:
//!
//! ```text
//! http://host:8000/anything  →  ws://host:8000/ws/chat
//! https://host/api           →  wss://host/ws/chat
//! ```

use thiserror::Error;
use url::Url;

/// Default upstream base when nothing is configured.
pub const DEFAULT_UPSTREAM_BASE: &str = "http://localhost:8000";

/// Path of the relay endpoint on the upstream service.
pub const DEFAULT_RELAY_PATH: &str = "/ws/chat";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid upstream base url {input:?}: {reason}")]
    Invalid { input: String, reason: String },

    #[error("unsupported upstream scheme {0:?} (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    #[error("upstream base url {0:?} has no host")]
    MissingHost(String),
}

/// Map an HTTP-style scheme to its WebSocket equivalent.
pub fn streaming_scheme(scheme: &str) -> Option<&'static str> {
    match scheme {
        "http" | "ws" => Some("ws"),
        "https" | "wss" => Some("wss"),
        _ => None,
    }
}

/// Build the WebSocket URL the relay dials for `base`.
///
/// Any path, query or fragment on `base` is replaced by `path`.
pub fn relay_target(base: &str, path: &str) -> Result<Url, AddressError> {
    let parsed = Url::parse(base.trim()).map_err(|e| AddressError::Invalid {
        input: base.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = streaming_scheme(parsed.scheme())
        .ok_or_else(|| AddressError::UnsupportedScheme(parsed.scheme().to_string()))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| AddressError::MissingHost(base.to_string()))?;

    // `Url::set_scheme` refuses http -> ws (special to non-special), so the
    // target is rebuilt from its parts instead.
    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    Url::parse(&format!("{}://{}{}", scheme, authority, path)).map_err(|e| AddressError::Invalid {
        input: base.to_string(),
        reason: e.to_string(),
    })
}
