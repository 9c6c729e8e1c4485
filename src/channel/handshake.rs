//! Upgrade handshake.
//!
//! The server accepts version 13 only. The accept key is derived with
//! tungstenite's RFC 6455 helper.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

pub const SUPPORTED_VERSION: &str = "13";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("unsupported websocket version {0:?}")]
    UnsupportedVersion(Option<String>),

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

/// Does the request ask to switch to the upgraded channel?
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// Validate the handshake headers and compute `Sec-WebSocket-Accept`.
pub fn accept_key(headers: &HeaderMap) -> Result<String, HandshakeError> {
    let version = headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    if version != Some(SUPPORTED_VERSION) {
        return Err(HandshakeError::UnsupportedVersion(version.map(str::to_string)));
    }

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .map(|v| v.as_bytes())
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;
    Ok(derive_accept_key(key))
}

/// `101 Switching Protocols` completing the handshake.
pub fn switching_protocols(accept: &str) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Ok(value) = HeaderValue::from_str(accept) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, value);
    }
    response
}
