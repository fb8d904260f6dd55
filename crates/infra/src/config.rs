//! Process configuration read from the environment.

use thiserror::Error;

use tally_gl::DEFAULT_SEPARATOR;
use tally_observability::{LogFormat, LogSettings};

pub const ACCOUNT_SEPARATOR_KEY: &str = "TALLY_ACCOUNT_SEPARATOR";
pub const LOG_FORMAT_KEY: &str = "TALLY_LOG_FORMAT";
pub const LOG_FILTER_KEY: &str = "TALLY_LOG_FILTER";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Joins segment values into account codes.
    pub account_separator: String,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account_separator: DEFAULT_SEPARATOR.to_string(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();

        if let Some(separator) = lookup(ACCOUNT_SEPARATOR_KEY) {
            if separator.is_empty() {
                return Err(ConfigError::Invalid {
                    key: ACCOUNT_SEPARATOR_KEY,
                    message: "separator cannot be empty".to_string(),
                });
            }
            settings.account_separator = separator;
        }

        if let Some(format) = lookup(LOG_FORMAT_KEY) {
            settings.log.format = format.parse::<LogFormat>().map_err(|e| ConfigError::Invalid {
                key: LOG_FORMAT_KEY,
                message: e.to_string(),
            })?;
        }

        if let Some(filter) = lookup(LOG_FILTER_KEY).filter(|f| !f.trim().is_empty()) {
            settings.log.filter = filter;
        }

        Ok(settings)
    }
}
