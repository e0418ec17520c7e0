//! Errors raised while loading or validating configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration error.
///
/// Every variant is fatal at startup; the server never runs with a partial
/// configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file {} does not exist", path.display())]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read config file {}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Neither TOML nor JSON.
    #[error("unsupported config format `{0}` (expected toml or json)")]
    UnsupportedFormat(String),

    /// Malformed TOML, or a key the schema does not know.
    #[error("malformed TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Malformed JSON, or a key the schema does not know.
    #[error("malformed JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A field holds a value the server cannot run with.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `server.port`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An override variable could not be parsed.
    #[error("environment variable {var}: {reason}")]
    EnvParseError {
        /// Variable name.
        var: String,
        /// What was expected.
        reason: String,
    },

    /// A `.env` file exists but could not be loaded.
    #[error("cannot load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

impl ConfigError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Reject the value of `field`.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}
