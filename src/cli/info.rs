use anyhow::Result;
use humantime::format_duration;
use roamdeck_cli::format_time_left;

use super::runtime::LoadedConfig;

pub fn cmd_info(loaded: &LoadedConfig) -> Result<()> {
    let config = &loaded.config;
    let timeouts = &config.handler.timeouts;

    println!("Roamdeck System Information");
    println!("===========================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {} ({})", env!("GIT_HASH"), env!("GIT_BRANCH"));
    println!();

    println!("Configuration:");
    println!(
        "- File: {}{}",
        loaded.path.display(),
        if loaded.found { "" } else { " (not found, defaults)" }
    );
    println!(
        "- Statement length: {}",
        format_time_left(config.session.question_length_secs())
    );
    println!("- Max roamers: {}", config.session.max_roamers);
    println!(
        "- Logging: level={} json={}",
        config.logging.level, config.logging.json
    );
    println!();

    println!("Call Handler:");
    println!(
        "- Action timeout: {}",
        format_duration(timeouts.action())
    );
    println!("- Settle delay: {}", format_duration(timeouts.settle()));
    println!(
        "- Confirmation settle: {}",
        format_duration(timeouts.confirmation_settle())
    );
    println!(
        "- Step timeout: {}",
        timeouts
            .step()
            .map(|limit| format_duration(limit).to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!(
        "- Attach timeout: {}",
        format_duration(timeouts.attach())
    );
    println!(
        "- Connect control: #{} {:?}",
        config.handler.connect.ordinal, config.handler.connect.label
    );
    println!(
        "- Disconnect control: #{} {:?}",
        config.handler.disconnect.ordinal, config.handler.disconnect.label
    );

    Ok(())
}
