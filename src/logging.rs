//! Structured logging utilities for Scriptorium
//!
//! All library logs go through `tracing` with structured fields so batch
//! runs can be filtered per document.
//!
//! # Log Format Conventions
//!
//! - `operation`: The operation being performed ("resolve", "build", "defrost")
//! - `status`: The result status ("hit", "miss", "stale", "error", ...)
//! - `document`: Document name as known to the source provider
//! - `generation`: Descriptor generation the event refers to
//! - `tag`: Language tag of the document
//!
//! # Examples
//!
//! ```rust
//! use tracing::debug;
//!
//! debug!(
//!     operation = "resolve",
//!     status = "hit",
//!     document = "lib/header.tmpl",
//!     generation = 3,
//!     "cache hit"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Event layout: `time level module: fields`
///
/// `module` is the event target relative to the crate, so events from
/// `scriptorium::document::cache` print as `document::cache`.
struct ScriptoriumFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for ScriptoriumFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();
        let time = chrono::Local::now().format("%H:%M:%S%.3f");
        let module = short_target(meta.target());

        if self.with_ansi {
            write!(
                writer,
                "{DIM}{time}{RESET} {}{:>5}{RESET} {DIM}{module}:{RESET} ",
                level_color(meta.level()),
                meta.level(),
            )?;
        } else {
            write!(writer, "{time} {:>5} {module}: ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[1;31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[36m",
        Level::DEBUG | Level::TRACE => "\x1b[2;37m",
    }
}

fn short_target(target: &str) -> &str {
    match target.strip_prefix("scriptorium") {
        Some("") => target,
        Some(rest) => rest.strip_prefix("::").unwrap_or(target),
        None => target,
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (default for development)
    Pretty,
    /// Same layout without colors (for CI)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    /// Parse from environment variable (SCRIPTORIUM_LOG_FORMAT)
    pub fn from_env() -> Self {
        Self::parse(
            &std::env::var("SCRIPTORIUM_LOG_FORMAT").unwrap_or_default(),
            std::env::var("CI").is_ok(),
        )
    }

    fn parse(value: &str, ci: bool) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ if ci => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "scriptorium=trace")
/// - `SCRIPTORIUM_LOG_FORMAT`: Set format ("pretty", "compact", "json")
/// - `CI`: If set, defaults to compact format
///
/// `default_level` applies when `RUST_LOG` is unset. Calling `init` twice
/// keeps the first subscriber.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match LogFormat::from_env() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(ScriptoriumFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(ScriptoriumFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}

/// Operation names for consistent logging
pub mod operations {
    pub const RESOLVE: &str = "resolve";
    pub const VALIDATE: &str = "validate";
    pub const BUILD: &str = "build";
    pub const DEFROST: &str = "defrost";
}

/// Status values for consistent logging
pub mod status {
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const STALE: &str = "stale";
    pub const SUCCESS: &str = "success";
    pub const DISCARDED: &str = "discarded";
    pub const ERROR: &str = "error";
    pub const INTERRUPTED: &str = "interrupted";
}
