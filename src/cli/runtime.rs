use std::path::PathBuf;

use anyhow::{Context, Result};
use roamdeck_cli::Config;
use tokio::fs;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    // Logs go to stderr so command output on stdout stays machine-readable.
    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.context("Failed to install log subscriber")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    pub found: bool,
}

/// Resolve the config path and read it. Runs before logging is installed,
/// so reporting is left to the caller.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    if fs::try_exists(&config_path).await.unwrap_or(false) {
        let content = fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        Ok(LoadedConfig {
            config,
            path: config_path,
            found: true,
        })
    } else {
        Ok(LoadedConfig {
            config: Config::default(),
            path: config_path,
            found: false,
        })
    }
}

fn default_config_path() -> Result<PathBuf> {
    // Priority: ./config/roamdeck.yaml > ~/.config/roamdeck/config.yaml
    let local_config = PathBuf::from("config/roamdeck.yaml");
    if local_config.exists() {
        return Ok(local_config);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("roamdeck");
    path.push("config.yaml");
    Ok(path)
}
