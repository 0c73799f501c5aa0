//! # parley-telemetry
//!
//! Installs the process-wide `tracing` subscriber.
//!
//! `RUST_LOG` always wins over the configured level so operators can raise
//! verbosity for one module (`RUST_LOG=parley_server::relay=debug`) without
//! touching the settings file.

#![deny(unsafe_code)]

use parley_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the log subscriber.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `"info"`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Whether to print the event target (module path).
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            format: settings.format,
            ..Self::default()
        }
    }
}

/// Build the filter: `RUST_LOG` if set and valid, otherwise `config.level`,
/// otherwise `info`.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging. Call once at startup.
///
/// Returns `false` if a global subscriber was already installed (for
/// example by a test harness), in which case the existing one is kept.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = env_filter(config);

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.with_target)
            .with_current_span(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
