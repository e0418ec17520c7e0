//! Main configuration types.
//!
//! This module provides the top-level [`TetherConfig`] struct and its builder.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_ws::{IdentityConfig, MAX_CONNECTION_TIMEOUT};

use crate::{ConfigError, LogFormat, LoggingConfig, ServerConfig, SessionConfig};

/// Complete Tether server configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use tether_config::TetherConfig;
///
/// let config = TetherConfig::default();
/// assert_eq!(config.server.port, 2000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session (identity) configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TetherConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TetherConfigBuilder {
        TetherConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The port is zero
    /// - Host and port do not form a valid socket address
    /// - The connection timeout is zero or longer than ten years
    /// - The log level is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid_value("server.port", "must be non-zero"));
        }

        self.socket_addr()?;

        if self.session.connection_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "session.connection_timeout_secs",
                "must be at least 1",
            ));
        }

        if self.session.connection_timeout_secs > MAX_CONNECTION_TIMEOUT.as_secs() {
            return Err(ConfigError::invalid_value(
                "session.connection_timeout_secs",
                format!("must be at most {}", MAX_CONNECTION_TIMEOUT.as_secs()),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }

        Ok(())
    }

    /// Resolve the bind address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if host and port do not resolve to
    /// a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let invalid = || {
            ConfigError::invalid_value(
                "server.host",
                format!(
                    "invalid socket address: {}:{}",
                    self.server.host, self.server.port
                ),
            )
        };
        (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)
    }

    /// Identity settings for the WebSocket endpoint.
    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig::new(self.connection_timeout()).secure(self.server.use_tls)
    }

    /// Identity cookie lifetime.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.session.connection_timeout_secs)
    }

    /// Graceful shutdown deadline.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Create a development configuration preset.
    ///
    /// Pretty, colored, debug-level logs bound to localhost.
    ///
    /// # Example
    ///
    /// ```
    /// use tether_config::TetherConfig;
    ///
    /// let config = TetherConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.host = "127.0.0.1".to_string();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.ansi_enabled = true;
        config.logging.include_location = true;
        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs at info level, secure cookies.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.server.use_tls = true;
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.logging.ansi_enabled = false;
        config
    }
}

/// Builder for [`TetherConfig`].
#[derive(Debug, Default)]
pub struct TetherConfigBuilder {
    server: Option<ServerConfig>,
    session: Option<SessionConfig>,
    logging: Option<LoggingConfig>,
}

impl TetherConfigBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the session configuration.
    #[must_use]
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> TetherConfig {
        TetherConfig {
            server: self.server.unwrap_or_default(),
            session: self.session.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<TetherConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
