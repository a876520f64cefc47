//! Registry configuration.
//!
//! Defaults suit the platform's backend. Deployments talking to a producer that
//! names its id fields differently override them through the environment:
//!
//! - `SERVEWISE_EVENT_ID_FIELDS`: comma-separated, e.g. `messageId,id`
//! - `SERVEWISE_EVENT_TIMESTAMP_FIELDS`: comma-separated, e.g. `sentAt`
//! - `SERVEWISE_CATCH_PANICS`: `true` / `false`

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instance::InstanceKeyConfig;

pub const ENV_ID_FIELDS: &str = "SERVEWISE_EVENT_ID_FIELDS";
pub const ENV_TIMESTAMP_FIELDS: &str = "SERVEWISE_EVENT_TIMESTAMP_FIELDS";
pub const ENV_CATCH_PANICS: &str = "SERVEWISE_CATCH_PANICS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must list at least one field name")]
    EmptyFieldList { var: &'static str },
    #[error("{var} must be `true` or `false`, got {value:?}")]
    InvalidBool { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Payload fields used to key event instances.
    pub instance_keys: InstanceKeyConfig,
    /// Contain panicking callbacks instead of unwinding through the transport.
    pub catch_panics: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            instance_keys: InstanceKeyConfig::default(),
            catch_panics: true,
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `SERVEWISE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`RegistryConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_ID_FIELDS) {
            config.instance_keys.id_fields = parse_fields(ENV_ID_FIELDS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMESTAMP_FIELDS) {
            config.instance_keys.timestamp_fields = parse_fields(ENV_TIMESTAMP_FIELDS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CATCH_PANICS) {
            config.catch_panics = match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::InvalidBool {
                        var: ENV_CATCH_PANICS,
                        value: raw,
                    });
                }
            };
        }

        tracing::debug!(?config, "registry configuration resolved");
        Ok(config)
    }
}

fn parse_fields(var: &'static str, raw: &str) -> Result<Vec<String>, ConfigError> {
    let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if fields.is_empty() {
        return Err(ConfigError::EmptyFieldList { var });
    }
    Ok(fields)
}
