//! HTTP routes served next to the WebSocket endpoint.
//!
//! The browser runtime loads `/__ax_init.js` first to learn its identity and
//! where to connect, then `/__ax.js` for the runtime itself, and finally
//! opens `/__ws`.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Response, StatusCode, Uri};
use http_body_util::Full;
use serde_json::{json, Value};
use tracing::{debug, error};

/// Type alias for HTTP response body.
pub type ResponseBody = Full<Bytes>;

/// Type alias for the HTTP response.
pub type HttpResponse = Response<ResponseBody>;

/// Path of the session bootstrap script.
pub const INIT_SCRIPT_PATH: &str = "/__ax_init.js";

/// Path of the static client runtime.
pub const CLIENT_SCRIPT_PATH: &str = "/__ax.js";

/// Path of the WebSocket endpoint.
pub const WS_PATH: &str = "/__ws";

const JAVASCRIPT: &str = "text/javascript";

/// Values the browser runtime needs before it can connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState<'a> {
    /// Connection identity.
    pub cid: &'a str,
    /// Identity cookie lifetime.
    pub conn_timeout: Duration,
    /// Host the page was loaded from, without port.
    pub host: &'a str,
    /// Port the server listens on.
    pub port: u16,
    /// Whether to connect with `wss://`.
    pub secure: bool,
}

impl SessionState<'_> {
    /// Render the bootstrap script.
    ///
    /// Strings are emitted as JSON literals so request-derived values cannot
    /// escape them.
    pub fn to_script(&self) -> String {
        format!(
            "var __state = {{cid:{},conn_timeout:{},host:{},port:{},secure:{}}};\n",
            Value::from(self.cid),
            self.conn_timeout.as_secs(),
            Value::from(self.host),
            self.port,
            self.secure,
        )
    }
}

/// Host the request was addressed to, without port.
///
/// Falls back to the URI authority, then to an empty string.
pub fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(http::uri::Authority::as_str))
        .map_or("", strip_port)
}

/// Remove a trailing `:port`, keeping bracketed IPv6 literals intact.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.split(':').next().unwrap_or(host)
}

/// `200` JavaScript response.
pub fn javascript(body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(JAVASCRIPT));
    response
}

/// Serve the client runtime from `path`.
pub async fn client_script(path: &Path) -> HttpResponse {
    match tokio::fs::read(path).await {
        Ok(contents) => javascript(contents),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Client script not found");
            json_error(StatusCode::NOT_FOUND, json!({ "error": "Not Found", "path": CLIENT_SCRIPT_PATH }))
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read client script");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal Server Error" }),
            )
        }
    }
}

/// JSON `404` for an unknown path.
pub fn not_found(path: &str) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, json!({ "error": "Not Found", "path": path }))
}

fn json_error(status: StatusCode, body: Value) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
