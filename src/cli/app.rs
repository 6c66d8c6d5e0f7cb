use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;

#[derive(Parser)]
#[command(author, version, about = "Operator console for live-event call rooms", long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (defaults to the configured level)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, default_value = "human", global = true)]
    pub output: crate::cli::output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}
