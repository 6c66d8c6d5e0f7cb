use clap::Subcommand;

use super::config::ConfigArgs;
use super::simulate::SimulateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run a full statement against a simulated room
    Simulate(SimulateArgs),

    /// Manage roamdeck configuration
    Config(ConfigArgs),

    /// Show build information and the effective configuration
    Info,
}
