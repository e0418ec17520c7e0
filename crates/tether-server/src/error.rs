//! Server error types.

use tether_config::ConfigError;
use tether_ws::WsError;
use thiserror::Error;

/// Errors that can stop the server from starting or running.
///
/// Per-connection failures never surface here; they are logged where they
/// happen and only end the affected connection.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("bind error: {0}")]
    Bind(String),

    /// I/O error outside of a single connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The WebSocket endpoint could not be built.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] WsError),

    /// Logging subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
