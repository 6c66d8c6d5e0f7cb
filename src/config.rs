//! Console configuration
//!
//! Loaded from YAML by the binary; every section falls back to defaults so a
//! partial file is valid.

use call_handler::CallPolicy;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const ENV_ACTION_TIMEOUT_MS: &str = "ROAMDECK_ACTION_TIMEOUT_MS";
pub const ENV_MAX_ROAMERS: &str = "ROAMDECK_MAX_ROAMERS";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub handler: CallPolicy,
    pub session: SessionSettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Length of one statement, in minutes.
    pub question_length_min: f64,
    /// Most callers allowed on stage at once.
    pub max_roamers: usize,
}

impl SessionSettings {
    pub fn question_length_secs(&self) -> i64 {
        (self.question_length_min * 60.0).round() as i64
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            question_length_min: 7.5,
            max_roamers: 6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any key/value source; `lookup` returns the raw
    /// value for a variable name when it is set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ACTION_TIMEOUT_MS) {
            self.handler.timeouts.action_ms = parse_override(ENV_ACTION_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_ROAMERS) {
            self.session.max_roamers = parse_override(ENV_MAX_ROAMERS, &value)?;
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            var,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "session:\n  max_roamers: 3\nhandler:\n  timeouts:\n    action_ms: 2500\n",
        )
        .unwrap();
        assert_eq!(config.session.max_roamers, 3);
        assert_eq!(config.session.question_length_min, 7.5);
        assert_eq!(config.handler.timeouts.action_ms, 2500);
        assert_eq!(config.handler.timeouts.settle_ms, 10);
        assert_eq!(config.handler.connect.label, "Connect");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn question_length_rounds_to_seconds() {
        assert_eq!(SessionSettings::default().question_length_secs(), 450);
        let settings = SessionSettings {
            question_length_min: 0.51,
            ..SessionSettings::default()
        };
        assert_eq!(settings.question_length_secs(), 31);
    }

    #[test]
    fn overrides_replace_values() {
        let mut config = Config::default();
        config
            .apply_overrides(|var| match var {
                ENV_ACTION_TIMEOUT_MS => Some("1500".into()),
                ENV_MAX_ROAMERS => Some(" 2 ".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.handler.timeouts.action_ms, 1500);
        assert_eq!(config.session.max_roamers, 2);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|var| (var == ENV_MAX_ROAMERS).then(|| "lots".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidOverride {
                var: ENV_MAX_ROAMERS,
                value: "lots".into()
            }
        );
        assert_eq!(config.session.max_roamers, 6);
    }
}
