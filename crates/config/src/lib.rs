//! Configuration management for the JOI voice worker
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (`JOI__` prefix, `__` separator)
//! - Serde defaults for everything else

pub mod settings;

pub use settings::{
    load_settings, GatewaySettings, PronunciationRule, Settings, TtsCacheSettings, TtsSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
