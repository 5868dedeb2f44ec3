use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::document::{BuildPolicy, HostOptions};
use crate::language::AdapterRegistry;
use crate::source::FilesystemSource;

/// Complete Scriptorium configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptoriumConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub defrost: DefrostConfig,

    #[serde(default)]
    pub languages: LanguagesConfig,
}

/// Filesystem source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory served by the filesystem provider (relative to the config file)
    #[serde(default = "default_root")]
    pub root: String,

    /// Glob patterns excluded from enumeration
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            exclude: Vec::new(),
        }
    }
}

/// Descriptor cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Minimum time between freshness checks of one document ("0s" = always)
    #[serde(default = "default_min_validity_interval")]
    pub min_validity_interval: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_validity_interval: default_min_validity_interval(),
        }
    }
}

/// Artifact build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// exclusive | optimistic
    #[serde(default)]
    pub policy: BuildPolicy,

    /// Exclusive policy: max wait on another caller's build
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            policy: BuildPolicy::default(),
            wait_timeout: default_wait_timeout(),
        }
    }
}

/// Bulk prewarming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefrostConfig {
    /// Worker threads (0 = auto)
    #[serde(default)]
    pub concurrency: usize,

    /// Wait for the batch to finish
    #[serde(default = "default_true")]
    pub blocking: bool,
}

impl Default for DefrostConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            blocking: true,
        }
    }
}

/// Language adapter routing
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LanguagesConfig {
    /// Extra tag -> adapter name
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

// Default value functions
fn default_root() -> String {
    ".".to_string()
}

fn default_min_validity_interval() -> String {
    "1s".to_string()
}

fn default_wait_timeout() -> String {
    "30s".to_string()
}

fn default_true() -> bool {
    true
}

/// Parse a duration such as "250ms", "1s", "5m", "2h" or "7d"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("Empty duration string"));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("Missing duration unit: {}. Use: ms, s, m, h, d", s))?;
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid duration: {}", s))?;

    let millis = match unit {
        "ms" => Some(num),
        "s" => num.checked_mul(1_000),
        "m" => num.checked_mul(60_000),
        "h" => num.checked_mul(3_600_000),
        "d" => num.checked_mul(86_400_000),
        _ => {
            return Err(anyhow!(
                "Invalid duration unit: {}. Use: ms, s, m, h, d",
                unit
            ))
        }
    };

    millis
        .map(Duration::from_millis)
        .ok_or_else(|| anyhow!("Duration out of range: {}", s))
}

impl ScriptoriumConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let mut config = ScriptoriumConfig::default();
        config.source.exclude = vec!["**/*.bak".to_string()];
        config
            .languages
            .aliases
            .insert("html".to_string(), "template".to_string());

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.source.root.trim().is_empty() {
            anyhow::bail!("source.root must be set");
        }

        for pattern in &self.source.exclude {
            glob::Pattern::new(pattern)
                .with_context(|| format!("source.exclude contains an invalid pattern: {}", pattern))?;
        }

        parse_duration(&self.cache.min_validity_interval)
            .context("cache.min_validity_interval is invalid")?;
        parse_duration(&self.build.wait_timeout).context("build.wait_timeout is invalid")?;

        self.registry()?;

        Ok(())
    }

    pub fn host_options(&self) -> Result<HostOptions> {
        Ok(HostOptions {
            min_validity_interval: parse_duration(&self.cache.min_validity_interval)
                .context("cache.min_validity_interval is invalid")?,
            build_policy: self.build.policy,
            build_wait_timeout: parse_duration(&self.build.wait_timeout)
                .context("build.wait_timeout is invalid")?,
        })
    }

    /// Built-in adapters plus the configured aliases
    pub fn registry(&self) -> Result<AdapterRegistry> {
        let mut registry = AdapterRegistry::with_builtin();
        for (tag, adapter) in &self.languages.aliases {
            registry
                .alias(tag, adapter)
                .with_context(|| format!("languages.aliases.{} is invalid", tag))?;
        }
        Ok(registry)
    }

    /// Source root, resolved against `base_dir` when relative
    pub fn source_root(&self, base_dir: &Path) -> PathBuf {
        let root = Path::new(&self.source.root);
        if root.is_absolute() {
            root.to_path_buf()
        } else if root == Path::new(".") {
            base_dir.to_path_buf()
        } else {
            base_dir.join(root)
        }
    }

    pub fn source_provider(&self, base_dir: &Path) -> Result<FilesystemSource> {
        FilesystemSource::new(self.source_root(base_dir))
            .with_exclude(&self.source.exclude)
            .context("source.exclude contains an invalid pattern")
    }

    /// Configured worker count, with 0 meaning host parallelism
    pub fn defrost_concurrency(&self) -> usize {
        match self.defrost.concurrency {
            0 => num_cpus::get(),
            n => n,
        }
    }
}
