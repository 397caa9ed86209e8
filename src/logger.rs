//! Tracing subscriber setup.
use serde::{Deserialize, Serialize};
use serde_variant::to_variant_name;
use tracing_subscriber::EnvFilter;

use crate::{config, Error, Result};

/// Level applied to every whitelisted module.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(to_variant_name(self).map_err(|_| std::fmt::Error)?)
    }
}

const MODULE_WHITELIST: &[&str] = &["durastore", "opendal"];

/// Builds the event filter for the given logger configuration.
///
/// `RUST_LOG` wins when set. Otherwise `override_filter` is used as is, and
/// without one only the crates in `MODULE_WHITELIST` log, at `config.level`.
///
/// # Errors
///
/// Returns an error when the override filter cannot be parsed.
pub fn filter(config: &config::Logger) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            config.override_filter.as_ref().map_or_else(
                || {
                    EnvFilter::try_new(
                        MODULE_WHITELIST
                            .iter()
                            .map(|module| format!("{module}={}", config.level))
                            .collect::<Vec<_>>()
                            .join(","),
                    )
                },
                EnvFilter::try_new,
            )
        })
        .map_err(Error::wrap)
}

/// Installs the global tracing subscriber. Does nothing when logging is
/// disabled.
///
/// # Errors
///
/// Returns an error when the filter is invalid or a global subscriber was
/// already installed.
pub fn init(config: &config::Logger) -> Result<()> {
    if !config.enable {
        return Ok(());
    }

    let builder = tracing_subscriber::FmtSubscriber::builder().with_env_filter(filter(config)?);

    match config.format {
        Format::Compact => builder.compact().try_init(),
        Format::Pretty => builder.pretty().try_init(),
        Format::Json => builder.json().try_init(),
    }
    .map_err(|err| Error::Message(format!("logger initialization failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_displays_as_config_name() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::default().to_string(), "info");
    }

    #[test]
    fn invalid_override_filter_is_an_error() {
        let config = config::Logger {
            enable: true,
            level: LogLevel::Info,
            format: Format::Compact,
            override_filter: Some("durastore=loud".to_string()),
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(filter(&config).is_err());
        }
    }
}
