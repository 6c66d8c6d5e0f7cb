mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use cli::app::CliArgs;
use cli::commands::Commands;
use cli::config::cmd_config;
use cli::info::cmd_info;
use cli::runtime::{init_logging, load_config};
use cli::simulate::cmd_simulate;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();

    let mut loaded = load_config(cli.config.as_ref()).await?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| loaded.config.logging.level.clone());
    init_logging(&level, cli.debug, loaded.config.logging.json)?;

    info!("Starting roamdeck v{}", env!("CARGO_PKG_VERSION"));
    if loaded.found {
        info!("Loaded configuration from: {}", loaded.path.display());
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            loaded.path.display()
        );
    }
    loaded.config.apply_env_overrides()?;

    let result = match cli.command {
        Commands::Simulate(args) => cmd_simulate(args, &loaded.config, cli.output).await,
        Commands::Config(args) => cmd_config(args, &loaded.path).await,
        Commands::Info => cmd_info(&loaded),
    };

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
