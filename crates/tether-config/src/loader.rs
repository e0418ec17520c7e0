//! Layered configuration loading.
//!
//! Layers apply in call order, each replacing what came before:
//! built-in defaults or a preset, then a file or string, then `.env`, then
//! `PREFIX__SECTION__KEY` environment variables. [`ConfigLoader::load`]
//! validates the result.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{ConfigError, LogFormat, TetherConfig};

/// Serialized configuration format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// TOML.
    Toml,
    /// JSON.
    Json,
}

impl Format {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        ext.parse()
    }

    fn parse(self, content: &str) -> Result<TetherConfig, ConfigError> {
        Ok(match self {
            Self::Toml => toml::from_str(content)?,
            Self::Json => serde_json::from_str(content)?,
        })
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Builds a [`TetherConfig`] from layered sources.
///
/// A file replaces the whole configuration; sections and keys it leaves out
/// fall back to their defaults.
///
/// # Example
///
/// ```no_run
/// use tether_config::ConfigLoader;
///
/// # fn main() -> Result<(), tether_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("tether.toml")?
///     .with_env_prefix("TETHER")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: TetherConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Loader seeded with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the built-in defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = TetherConfig::default();
        self
    }

    /// Reset to the development preset.
    ///
    /// ```
    /// use tether_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = TetherConfig::development();
        self
    }

    /// Reset to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = TetherConfig::production();
        self
    }

    /// Replace the configuration with the contents of a `.toml` or `.json`
    /// file. Unknown keys are rejected.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;

        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::file_not_found(path),
            _ => ConfigError::read_error(path, e),
        })?;

        self.config = format.parse(&content)?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file leaves the
    /// configuration untouched.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Replace the configuration with inline content.
    ///
    /// ```
    /// use tether_config::{ConfigLoader, Format};
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nport = 3000", Format::Toml)
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.server.port, 3000);
    /// ```
    pub fn with_string(mut self, content: &str, format: Format) -> Result<Self, ConfigError> {
        self.config = format.parse(content)?;
        Ok(self)
    }

    /// Read overrides from `PREFIX__SECTION__KEY` variables at load time,
    /// e.g. `TETHER__SERVER__PORT=8080`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Export variables from a `.env` file in the current directory or a
    /// parent. Having none is fine.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Export variables from a specific `.env` file, which must exist.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// Apply environment overrides and validate.
    ///
    /// ```
    /// use tether_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().load().unwrap();
    /// assert_eq!(config.server.port, 2000);
    /// ```
    pub fn load(mut self) -> Result<TetherConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            for (key, value) in env::vars() {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration as is, skipping overrides and validation.
    #[must_use]
    pub fn load_unvalidated(self) -> TetherConfig {
        self.config
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        // TETHERING_MODE shares the prefix but not the separator.
        let Some(path) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };
        let Some((section, field)) = path.split_once("__") else {
            return Ok(());
        };

        let server = &mut self.config.server;
        let session = &mut self.config.session;
        let logging = &mut self.config.logging;

        match (section, field) {
            ("SERVER", "HOST") => server.host = value.to_string(),
            ("SERVER", "PORT") => server.port = parse_env(key, value, "expected port number")?,
            ("SERVER", "USE_TLS") => server.use_tls = parse_flag(key, value)?,
            ("SERVER", "CLIENT_SCRIPT") => server.client_script = PathBuf::from(value),
            ("SERVER", "SHUTDOWN_TIMEOUT_SECS") => {
                server.shutdown_timeout_secs = parse_env(key, value, "expected seconds")?;
            }
            ("SESSION", "CONNECTION_TIMEOUT_SECS") => {
                session.connection_timeout_secs = parse_env(key, value, "expected seconds")?;
            }
            ("LOGGING", "ENABLED") => logging.enabled = parse_flag(key, value)?,
            ("LOGGING", "LEVEL") => logging.level = value.to_string(),
            ("LOGGING", "FORMAT") => {
                logging.format = match value.to_ascii_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected json or pretty")),
                };
            }
            ("LOGGING", "ANSI_ENABLED") => logging.ansi_enabled = parse_flag(key, value)?,
            ("LOGGING", "INCLUDE_LOCATION") => logging.include_location = parse_flag(key, value)?,
            _ => {}
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, expected))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}
