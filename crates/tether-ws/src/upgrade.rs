//! RFC 6455 opening handshake, server side.
//!
//! This module only decides whether a request may be upgraded and builds
//! the `101` (or `400`) response. Taking over the IO is left to the HTTP
//! layer, which passes the resulting socket to
//! [`Endpoint::serve`](crate::Endpoint::serve).

use base64::Engine;
use bytes::Bytes;
use http::{header, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use sha1::{Digest, Sha1};
use tracing::instrument;

use crate::error::{WsError, WsResult};

const HANDSHAKE_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header requirements, checked in order. The first failure is reported.
const REQUIRED: [(HeaderName, fn(&str) -> bool, &str); 2] = [
    (header::CONNECTION, lists_upgrade, "missing Connection: Upgrade header"),
    (header::UPGRADE, is_websocket, "missing Upgrade: websocket header"),
];

fn lists_upgrade(value: &str) -> bool {
    value
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

fn is_websocket(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("websocket")
}

fn header_value<'a, B>(request: &'a Request<B>, name: &HeaderName) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Whether `request` is an acceptable upgrade request.
pub fn is_websocket_request<B>(request: &Request<B>) -> bool {
    validate_upgrade_request(request).is_ok()
}

/// `Sec-WebSocket-Accept` for a client key: base64 of SHA-1 over the key
/// followed by the handshake GUID.
pub fn compute_accept_key(key: &str) -> String {
    let digest = Sha1::new()
        .chain_update(key.as_bytes())
        .chain_update(HANDSHAKE_GUID)
        .finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Check an upgrade request and return the accept key to answer with.
#[instrument(skip(request), level = "debug")]
pub fn validate_upgrade_request<B>(request: &Request<B>) -> WsResult<String> {
    if request.method() != Method::GET {
        return Err(WsError::not_websocket("upgrade requires GET"));
    }

    for (name, accepts, reason) in &REQUIRED {
        if !header_value(request, name).is_some_and(accepts) {
            return Err(WsError::not_websocket(*reason));
        }
    }

    let key = header_value(request, &header::SEC_WEBSOCKET_KEY)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| WsError::not_websocket("missing Sec-WebSocket-Key header"))?;

    match header_value(request, &header::SEC_WEBSOCKET_VERSION).map(str::trim) {
        Some("13") => Ok(compute_accept_key(key)),
        _ => Err(WsError::not_websocket("Sec-WebSocket-Version must be 13")),
    }
}

/// `101 Switching Protocols` carrying `accept_key`.
pub fn upgrade_response(accept_key: &str) -> WsResult<Response<Full<Bytes>>> {
    let accept = HeaderValue::from_str(accept_key)
        .map_err(|_| WsError::not_websocket("accept key is not a valid header value"))?;

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    response.headers_mut().extend([
        (header::CONNECTION, HeaderValue::from_static("Upgrade")),
        (header::UPGRADE, HeaderValue::from_static("websocket")),
        (header::SEC_WEBSOCKET_ACCEPT, accept),
    ]);
    Ok(response)
}

/// Plain-text `400` explaining why an upgrade was refused.
pub fn bad_request_response(error: &WsError) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(error.to_string())));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
