//! Errors raised while building [`RelaySettings`](crate::RelaySettings).

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read relay settings: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON, or does not match the schema.
    #[error("relay settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Raised by `RelaySettings::validate` and by the `RelayMode` and
    /// `LogFormat` parsers.
    #[error("bad relay setting: {0}")]
    InvalidValue(String),
}

/// Shorthand for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;
