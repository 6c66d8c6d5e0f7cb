use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use roamdeck_cli::{Config, ConfigError};
use serde_json::Value as JsonValue;
use tokio::fs;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file location
    Path,

    /// Get a configuration value by dotted key, e.g. `session.max_roamers`
    Get {
        /// Configuration key
        key: String,
    },

    /// Set an existing configuration value by dotted key
    Set {
        /// Configuration key
        key: String,

        /// Configuration value
        value: String,
    },

    /// Reset configuration to defaults
    Reset,
}

pub async fn cmd_config(args: ConfigArgs, path: &Path) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = load_config_file(path).await?;
            println!("Current configuration ({}):", path.display());
            print!("{}", serde_yaml::to_string(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Get { key } => {
            let config = load_config_file(path).await?;
            let json = serde_json::to_value(&config)?;
            let value = get_json_value(&json, &split_key(&key)?)
                .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            print!("{}", serde_yaml::to_string(value)?);
        }
        ConfigAction::Set { key, value } => {
            let config = load_config_file(path).await?;
            let mut json = serde_json::to_value(&config)?;
            let slot = get_json_value_mut(&mut json, &split_key(&key)?)
                .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            *slot = parse_cli_value(&value);
            let config: Config = serde_json::from_value(json)
                .with_context(|| format!("{value:?} is not valid for {key}"))?;
            save_config_file(path, &config).await?;
            info!("Updated configuration key {}", key);
            println!("Saved configuration to {}", path.display());
        }
        ConfigAction::Reset => {
            save_config_file(path, &Config::default()).await?;
            println!(
                "Configuration reset to defaults and written to {}",
                path.display()
            );
        }
    }

    Ok(())
}

async fn load_config_file(path: &Path) -> Result<Config> {
    if fs::try_exists(path).await? {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let config =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

async fn save_config_file(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let serialized = serde_yaml::to_string(config)?;
    fs::write(path, serialized)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn parse_cli_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn split_key(key: &str) -> Result<Vec<&str>, ConfigError> {
    let segments: Vec<&str> = key
        .split('.')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(ConfigError::UnknownKey(key.to_string()));
    }
    Ok(segments)
}

fn get_json_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    path.iter()
        .try_fold(value, |current, segment| current.as_object()?.get(*segment))
}

fn get_json_value_mut<'a>(value: &'a mut JsonValue, path: &[&str]) -> Option<&'a mut JsonValue> {
    path.iter().try_fold(value, |current, segment| {
        current.as_object_mut()?.get_mut(*segment)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_keys_resolve_against_defaults() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(
            get_json_value(&json, &split_key("session.max_roamers").unwrap()),
            Some(&JsonValue::from(6))
        );
        assert_eq!(
            get_json_value(&json, &split_key("handler.connect.label").unwrap()),
            Some(&JsonValue::from("Connect"))
        );
        assert!(get_json_value(&json, &["session", "nope"]).is_none());
        assert!(get_json_value(&json, &["session", "max_roamers", "deeper"]).is_none());
    }

    #[test]
    fn set_replaces_only_existing_keys() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        *get_json_value_mut(&mut json, &["handler", "timeouts", "action_ms"]).unwrap() =
            parse_cli_value("2500");
        let config: Config = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(config.handler.timeouts.action_ms, 2500);
        assert!(get_json_value_mut(&mut json, &["handler", "missing"]).is_none());
    }

    #[test]
    fn empty_keys_are_rejected() {
        assert_eq!(
            split_key("..").unwrap_err(),
            ConfigError::UnknownKey("..".into())
        );
    }
}
