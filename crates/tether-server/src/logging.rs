//! Global `tracing` subscriber.
//!
//! Output is JSON lines by default, or the multi-line pretty format for
//! local development. Both go through the same [`EnvFilter`].
//!
//! ```rust,ignore
//! use tether_config::TetherConfig;
//! use tether_server::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::from(&TetherConfig::development().logging))?;
//! tracing::info!(cid = "abc", "Client connected");
//! ```

use tether_config::{LogFormat, LoggingConfig};
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{ServerError, ServerResult};

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Install a subscriber at all.
    pub enabled: bool,
    /// `EnvFilter` directive.
    pub level: String,
    /// JSON lines instead of pretty output.
    pub json_format: bool,
    /// Log span open and close.
    pub span_events: bool,
    /// Add source file and line.
    pub file_line_info: bool,
    /// Colour pretty output. Ignored for JSON.
    pub ansi: bool,
    /// Add the module path of each event.
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(&LoggingConfig::default())
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            level: config.level.clone(),
            json_format: config.format == LogFormat::Json,
            span_events: false,
            file_line_info: config.include_location,
            ansi: config.ansi_enabled,
            include_target: true,
        }
    }
}

/// Install the global subscriber, unless logging is disabled.
///
/// Fails with [`ServerError::LoggingInit`] on a bad filter directive or
/// when a global subscriber already exists.
pub fn init_logging(config: &LogConfig) -> ServerResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    tracing_subscriber::registry()
        .with(format_layer(config).with_filter(filter))
        .try_init()
        .map_err(|e| ServerError::LoggingInit(e.to_string()))
}

fn format_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_target(config.include_target);

    if config.json_format {
        layer.json().boxed()
    } else {
        layer.pretty().with_ansi(config.ansi).boxed()
    }
}

/// Parse a filter directive such as `info` or `tether_ws=debug,warn`.
pub fn create_env_filter(directive: &str) -> ServerResult<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| ServerError::LoggingInit(format!("invalid log level '{directive}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_config::TetherConfig;

    #[test]
    fn test_default_is_json_at_info() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert!(config.json_format);
        assert!(config.include_target);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_from_development_preset() {
        let config = LogConfig::from(&TetherConfig::development().logging);
        assert!(!config.json_format);
        assert!(config.ansi);
        assert!(config.file_line_info);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_from_custom_section() {
        let logging = LoggingConfig {
            level: "tether_ws=debug,warn".to_owned(),
            format: LogFormat::Pretty,
            ..LoggingConfig::default()
        };
        let config = LogConfig::from(&logging);
        assert!(!config.json_format);
        assert!(!config.file_line_info);
        assert_eq!(config.level, "tether_ws=debug,warn");
    }

    #[test]
    fn test_filter_directives() {
        assert!(create_env_filter("info").is_ok());
        assert!(create_env_filter("tether_ws=debug,info").is_ok());

        let err = create_env_filter("tether_ws=notalevel").unwrap_err();
        assert!(err.to_string().contains("tether_ws=notalevel"));
    }

    #[test]
    fn test_bad_directive_fails_before_install() {
        let config = LogConfig {
            level: "tether_ws=notalevel".to_owned(),
            ..LogConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(ServerError::LoggingInit(_))));
    }

    #[test]
    fn test_disabled_installs_nothing() {
        let config = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
