//! Typed configuration for Tether.
//!
//! This crate provides a strongly-typed configuration system for Tether
//! servers with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! The configuration system is built around the [`TetherConfig`] struct:
//!
//! - [`ServerConfig`] - Bind address, TLS flag, client runtime path, shutdown timeout
//! - [`SessionConfig`] - Identity cookie lifetime
//! - [`LoggingConfig`] - Log level and format
//!
//! # Example
//!
//! ```no_run
//! use tether_config::ConfigLoader;
//!
//! # fn main() -> Result<(), tether_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("tether.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("TETHER")
//!     .load()?;
//!
//! println!("Server will listen on: {}", config.socket_addr()?);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 2000
//! use_tls = false
//! client_script = "./ax/ax.js"
//! shutdown_timeout_secs = 30
//!
//! [session]
//! connection_timeout_secs = 300
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! All configuration values can be overridden via environment variables using
//! the format `PREFIX__SECTION__KEY`. For example:
//!
//! - `TETHER__SERVER__PORT=8080`
//! - `TETHER__SERVER__USE_TLS=true`
//! - `TETHER__SESSION__CONNECTION_TIMEOUT_SECS=600`
//! - `TETHER__LOGGING__LEVEL=debug`

mod config;
mod error;
mod loader;
mod schema;

pub use config::{TetherConfig, TetherConfigBuilder};
pub use error::ConfigError;
pub use loader::{ConfigLoader, Format};
pub use schema::{
    LogFormat, LoggingConfig, ServerConfig, SessionConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_PORT,
};
