use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::ScriptoriumConfig;

pub const CONFIG_FILE_NAME: &str = "scriptorium.toml";

/// Discovers Scriptorium configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Ok(Some(config_path));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    if let Some(global_config) = global_config_path() {
        if global_config.is_file() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// `~/.config/scriptorium/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/scriptorium/config.toml"))
}

/// A configuration together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ScriptoriumConfig,
    /// File the configuration was read from, `None` for built-in defaults
    pub path: Option<PathBuf>,
    /// Directory relative paths in the configuration are resolved against
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    fn from_path(path: PathBuf) -> Result<Self> {
        let config = ScriptoriumConfig::from_file(&path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            config,
            path: Some(path),
            base_dir,
        })
    }
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up directory tree from
/// `start_dir`. Falls back to defaults rooted at `start_dir` when nothing is
/// found.
pub fn load_config_with_discovery(
    explicit_path: Option<&Path>,
    start_dir: &Path,
) -> Result<LoadedConfig> {
    if let Some(config_path) = explicit_path {
        return LoadedConfig::from_path(config_path.to_path_buf());
    }

    match discover_config(start_dir)? {
        Some(discovered_path) => LoadedConfig::from_path(discovered_path),
        None => Ok(LoadedConfig {
            config: ScriptoriumConfig::default(),
            path: None,
            base_dir: start_dir.to_path_buf(),
        }),
    }
}

/// [`load_config_with_discovery`] starting at the current directory
pub fn load_config_from_cwd(explicit_path: Option<&Path>) -> Result<LoadedConfig> {
    let current_dir =
        std::env::current_dir().context("Failed to get current directory for config discovery")?;
    load_config_with_discovery(explicit_path, &current_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_config_finds_nearest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let project = root.join("project");
        let subdir = project.join("subdir");
        fs::create_dir_all(&subdir).unwrap();

        let config_path = project.join(CONFIG_FILE_NAME);
        fs::write(&config_path, "# test config").unwrap();

        let found = discover_config(&subdir).unwrap();
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_explicit_path_resolves_relative_root() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("custom.toml");
        fs::write(&config_path, "[source]\nroot = \"docs\"\n").unwrap();

        let loaded = load_config_with_discovery(Some(&config_path), Path::new("/")).unwrap();

        assert_eq!(loaded.path.as_deref(), Some(config_path.as_path()));
        assert_eq!(loaded.base_dir, temp.path());
        assert_eq!(
            loaded.config.source_root(&loaded.base_dir),
            temp.path().join("docs")
        );
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[cache\n").unwrap();

        assert!(load_config_with_discovery(Some(&config_path), temp.path()).is_err());
    }

    #[test]
    #[serial]
    fn test_global_config_fallback() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let global = home.path().join(".config/scriptorium/config.toml");
        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(&global, "[defrost]\nconcurrency = 2\n").unwrap();

        let previous = std::env::var_os("HOME");
        std::env::set_var("HOME", home.path());
        let loaded = load_config_with_discovery(None, work.path());
        match previous {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }

        let loaded = loaded.unwrap();
        assert_eq!(loaded.path, Some(global));
        assert_eq!(loaded.config.defrost.concurrency, 2);
    }
}
