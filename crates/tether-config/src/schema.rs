//! Configuration sections.
//!
//! Every section is `#[serde(default)]`: a file only needs the keys it
//! changes, and anything it leaves out comes from the section's
//! [`Default`]. Unknown keys are rejected.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Port the server binds when none is configured.
pub const DEFAULT_PORT: u16 = 2000;

/// Identity cookie lifetime when none is configured, in seconds.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 300;

/// `[server]`: listening socket, transport flag and static runtime.
///
/// ```
/// use tether_config::ServerConfig;
///
/// let config = ServerConfig {
///     host: "127.0.0.1".to_owned(),
///     port: 8080,
///     ..ServerConfig::default()
/// };
/// assert!(!config.use_tls);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to bind. Also reported to the browser runtime.
    pub port: u16,

    /// Clients connect through TLS terminated in front of this server.
    ///
    /// Selects `wss://` in the browser and marks the identity cookie
    /// `Secure`. The server itself always speaks plain HTTP.
    pub use_tls: bool,

    /// File served verbatim at `/__ax.js`.
    pub client_script: PathBuf,

    /// Seconds to wait for sessions to close after shutdown is triggered.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: DEFAULT_PORT,
            use_tls: false,
            client_script: PathBuf::from("./ax/ax.js"),
            shutdown_timeout_secs: 30,
        }
    }
}

/// `[session]`: identity cookie settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Identity cookie lifetime in seconds, renewed while connected.
    pub connection_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
        }
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// When false no subscriber is installed.
    pub enabled: bool,

    /// Level or `EnvFilter` directive, e.g. `info` or `tether_ws=debug,info`.
    pub level: String,

    /// Line encoding.
    pub format: LogFormat,

    /// Colour the output.
    pub ansi_enabled: bool,

    /// Add source file and line to each event.
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_owned(),
            format: LogFormat::Json,
            ansi_enabled: false,
            include_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 2000);
        assert!(!config.use_tls);
        assert_eq!(config.client_script, PathBuf::from("./ax/ax.js"));
        assert_eq!(config.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_session_default_is_five_minutes() {
        assert_eq!(SessionConfig::default().connection_timeout_secs, 300);
    }

    #[test]
    fn test_log_format_names() {
        assert_eq!(serde_json::from_str::<LogFormat>(r#""pretty""#).unwrap(), LogFormat::Pretty);
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), r#""json""#);
        assert!(serde_json::from_str::<LogFormat>(r#""xml""#).is_err());
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let server: ServerConfig = toml::from_str("port = 9000").unwrap();
        assert_eq!(server.port, 9000);
        assert_eq!(server.host, "0.0.0.0");

        let logging: LoggingConfig = toml::from_str(r#"format = "pretty""#).unwrap();
        assert!(logging.enabled);
        assert_eq!(logging.level, "info");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<SessionConfig>("timeout = 5").is_err());
    }
}
