pub mod config;
pub mod defrost;
pub mod list;
pub mod render;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cli::CommonConfigArgs;
use scriptorium::config_discovery::{load_config_from_cwd, LoadedConfig};
use scriptorium::DocumentHost;

/// Discovered (or explicit) configuration with command-line overrides applied
pub fn load_config(common: &CommonConfigArgs) -> Result<LoadedConfig> {
    let mut loaded = load_config_from_cwd(common.config.as_deref().map(Path::new))?;

    match &loaded.path {
        Some(path) => info!("Using config: {}", path.display()),
        None => debug!("No configuration file found, using defaults"),
    }

    if let Some(root) = &common.root {
        // Relative to the invocation directory, not to the config file.
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        loaded.config.source.root = cwd.join(root).to_string_lossy().into_owned();
    }
    if let Some(interval) = &common.min_validity_interval {
        loaded.config.cache.min_validity_interval = interval.clone();
    }

    Ok(loaded)
}

/// Host serving the configured source tree
pub fn open_host(common: &CommonConfigArgs) -> Result<(LoadedConfig, Arc<DocumentHost>)> {
    let loaded = load_config(common)?;
    let config = &loaded.config;
    config.validate().context("Invalid configuration")?;

    let provider = config.source_provider(&loaded.base_dir)?;
    let root = provider.root().to_path_buf();
    if !root.is_dir() {
        anyhow::bail!("Source root is not a directory: {}", root.display());
    }

    let host = DocumentHost::with_options(
        Arc::new(provider),
        config.registry()?,
        config.host_options()?,
    );
    debug!("Serving documents from {}", root.display());

    Ok((loaded, Arc::new(host)))
}
