use clap::{Args, Parser, Subcommand};

/// Scriptorium - Document host with a validating artifact cache
///
/// Scriptorium resolves named documents from a source tree, compiles them
/// through language adapters and keeps the results cached until their
/// source changes.
#[derive(Parser, Debug)]
#[command(name = "scriptorium")]
#[command(author = "Scriptorium Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Document host with a validating artifact cache", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Common configuration arguments shared across commands
#[derive(Args, Debug, Clone)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, global = true, env = "SCRIPTORIUM_CONFIG")]
    pub config: Option<String>,

    /// Source root directory (overrides source.root)
    #[arg(long, global = true, env = "SCRIPTORIUM_ROOT")]
    pub root: Option<String>,

    /// Minimum interval between freshness checks (e.g. "0s", "500ms")
    #[arg(long, global = true, env = "SCRIPTORIUM_MIN_VALIDITY_INTERVAL")]
    pub min_validity_interval: Option<String>,

    /// Log level used when RUST_LOG is unset (trace|debug|info|warn|error)
    #[arg(long, global = true, env = "SCRIPTORIUM_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the documents known to the source
    List(ListArgs),

    /// Build one document and print its output
    Render(RenderArgs),

    /// Build every document in parallel
    Defrost(DefrostArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Print the names as a JSON array
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Document name, relative to the source root
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct DefrostArgs {
    /// Worker threads (default: defrost.concurrency, 0 = all cores)
    #[arg(long, env = "SCRIPTORIUM_DEFROST_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Start the batch without blocking and report progress while it runs
    #[arg(long)]
    pub background: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print an example config file
    Example,
    /// Validate a configuration file (default: the discovered one)
    Validate {
        /// Path to config file
        path: Option<String>,
    },
    /// Show effective configuration
    Show,
}
