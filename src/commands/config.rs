use anyhow::Result;
use std::process::ExitCode;
use tracing::info;

use crate::cli::{CommonConfigArgs, ConfigCommands};
use scriptorium::config::ScriptoriumConfig;

pub fn run(common: &CommonConfigArgs, command: ConfigCommands) -> Result<ExitCode> {
    match command {
        ConfigCommands::Example => example(),
        ConfigCommands::Validate { path } => validate(common, path.as_deref()),
        ConfigCommands::Show => show(common),
    }?;
    Ok(ExitCode::SUCCESS)
}

fn example() -> Result<()> {
    println!("{}", ScriptoriumConfig::example()?);
    Ok(())
}

fn validate(common: &CommonConfigArgs, path: Option<&str>) -> Result<()> {
    let (config, label) = match path {
        Some(path) => {
            info!("Validating config file: {}", path);
            (ScriptoriumConfig::from_file(path)?, path.to_string())
        }
        None => {
            let loaded = super::load_config(common)?;
            let label = loaded
                .path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string());
            (loaded.config, label)
        }
    };
    config.validate()?;

    println!("✓ Configuration is valid: {}", label);
    println!("\nSummary:");
    println!("  - Source root: {}", config.source.root);
    println!("  - Excluded patterns: {}", config.source.exclude.len());
    println!(
        "  - Min validity interval: {}",
        config.cache.min_validity_interval
    );
    println!(
        "  - Build policy: {:?} (wait timeout: {})",
        config.build.policy, config.build.wait_timeout
    );
    println!("  - Defrost workers: {}", config.defrost_concurrency());

    for (tag, adapter) in &config.languages.aliases {
        println!("    {} -> {}", tag, adapter);
    }

    Ok(())
}

fn show(common: &CommonConfigArgs) -> Result<()> {
    info!("Showing effective configuration");

    let loaded = super::load_config(common)?;

    println!("Effective Configuration:\n");
    println!("{}", toml::to_string_pretty(&loaded.config)?);

    Ok(())
}
