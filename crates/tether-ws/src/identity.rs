//! Connection identity.
//!
//! Every browser session carries an opaque token in the `__cid__` cookie.
//! The token is not a credential; it only needs enough entropy that two
//! sessions never collide in practice. A request with no usable cookie gets
//! a freshly generated token, and a live connection keeps re-issuing the
//! cookie so the identity never lapses while the tab stays open.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::{header, HeaderMap};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

use crate::message::{Envelope, SET_COOKIE_TYPE};

/// Name of the identity cookie.
pub const COOKIE_NAME: &str = "__cid__";

/// Length of a generated identity token.
pub const IDENTITY_LEN: usize = 20;

/// Longest cookie lifetime a configuration may ask for (ten years).
pub const MAX_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// 9999-12-31T23:59:59Z, the last instant an HTTP date can express.
const LAST_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// How identities are issued and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Cookie lifetime measured from issuance or refresh (default: 300 seconds).
    pub connection_timeout: Duration,
    /// Whether the transport is encrypted; adds `Secure` to the cookie.
    pub secure: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(300),
            secure: false,
        }
    }
}

impl IdentityConfig {
    /// Create a configuration with the given cookie lifetime.
    pub fn new(connection_timeout: Duration) -> Self {
        Self {
            connection_timeout,
            ..Self::default()
        }
    }

    /// Set whether the transport is encrypted.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Outcome of resolving a request's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The identity to use for this request.
    pub id: String,
    /// `true` if the identity was generated for this request and the
    /// cookie must be set on the response.
    pub issued: bool,
}

/// Payload of the reserved cookie refresh message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieRefresh {
    /// Cookie name.
    pub name: &'static str,
    /// Identity value.
    pub value: String,
    /// Cookie path.
    pub path: &'static str,
    /// Absolute expiry as an HTTP date.
    pub expires: String,
    /// Lifetime in seconds.
    pub max_age: u64,
}

/// Issues, recognises and refreshes identities.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    config: IdentityConfig,
}

impl Identity {
    /// Create an identity issuer.
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Generate a fresh random identity.
    pub fn generate() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(IDENTITY_LEN)
            .map(char::from)
            .collect()
    }

    /// Check whether a cookie value has the shape of an issued identity.
    pub fn is_valid(value: &str) -> bool {
        value.len() == IDENTITY_LEN && value.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// Find a valid identity in the request's `Cookie` headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| name.trim() == COOKIE_NAME)
            .map(|(_, value)| value.trim().trim_matches('"'))
            .find(|value| Self::is_valid(value))
            .map(str::to_owned)
    }

    /// Look up the request's identity, or issue a new one.
    ///
    /// Lookup failure is never an error: a missing or malformed cookie
    /// simply yields a fresh identity with `issued` set.
    pub fn resolve(&self, headers: &HeaderMap) -> Resolved {
        match Self::from_headers(headers) {
            Some(id) => Resolved { id, issued: false },
            None => Resolved {
                id: Self::generate(),
                issued: true,
            },
        }
    }

    /// Cookie expiry for a cookie issued at `now`, clamped to what an
    /// HTTP date can express.
    pub fn expires_at(&self, now: SystemTime) -> SystemTime {
        let latest = UNIX_EPOCH + Duration::from_secs(LAST_HTTP_DATE_SECS);
        now.checked_add(self.config.connection_timeout)
            .map_or(latest, |expires| expires.clamp(UNIX_EPOCH, latest))
    }

    /// Build the `Set-Cookie` header value for `id`, issued at `now`.
    pub fn set_cookie(&self, id: &str, now: SystemTime) -> String {
        let mut cookie = format!(
            "{COOKIE_NAME}={id}; Path=/; Expires={}; SameSite=Lax",
            httpdate::fmt_http_date(self.expires_at(now))
        );
        if self.config.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Build the reserved message asking the browser to (re)store its cookie.
    pub fn refresh_message(&self, id: &str, now: SystemTime) -> Envelope<CookieRefresh> {
        Envelope::new(
            SET_COOKIE_TYPE,
            CookieRefresh {
                name: COOKIE_NAME,
                value: id.to_owned(),
                path: "/",
                expires: httpdate::fmt_http_date(self.expires_at(now)),
                max_age: self.config.connection_timeout.as_secs(),
            },
        )
    }

    /// Whether enough of the cookie lifetime has passed to re-issue it.
    pub fn needs_refresh(&self, since_last_issue: Duration) -> bool {
        since_last_issue > self.config.connection_timeout / 2
    }
}
