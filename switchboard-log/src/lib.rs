//! Switchboard Logging
//!
//! Installs the `tracing` subscriber shared by the Switchboard binaries,
//! configured from `SWITCHBOARD_*` environment variables.
//!
//! # Usage
//!
//! ```rust,no_run
//! switchboard_log::init().expect("logging already initialised");
//!
//! let room = "room1";
//! tracing::info!(room = %room, "Client joined room");
//! ```
//!
//! # Environment Variables
//!
//! - `SWITCHBOARD_DEBUG=1` - Enable debug logging
//! - `SWITCHBOARD_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `SWITCHBOARD_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `SWITCHBOARD_LOG_COLOR=1|0` - Enable/disable colors
//! - `SWITCHBOARD_LOG_TIMESTAMPS=1|0` - Enable/disable timestamps
//! - `SWITCHBOARD_LOG_MODULE=1|0` - Enable/disable the event target
//!
//! `RUST_LOG`, when set, replaces the level with a full filter directive.

use once_cell::sync::Lazy;
use std::env;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level for Switchboard logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Get level from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" | "critical" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// Filter directive for this level.
    pub fn directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Get format from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Global configuration (lazy initialized).
static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include the event target
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Compact,
            color: false,
            timestamps: true,
            module_path: true,
        }
    }
}

fn flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup("SWITCHBOARD_DEBUG").is_some_and(|v| flag(&v));

        let level = lookup("SWITCHBOARD_LOG_LEVEL")
            .and_then(|s| Level::from_str(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("SWITCHBOARD_LOG_FORMAT")
            .and_then(|s| Format::from_str(&s))
            .unwrap_or(Format::Compact);

        // Simple check - assume color if not explicitly disabled
        let color = lookup("SWITCHBOARD_LOG_COLOR")
            .map(|v| flag(&v))
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let timestamps = lookup("SWITCHBOARD_LOG_TIMESTAMPS")
            .map(|v| flag(&v))
            .unwrap_or(true);

        let module_path = lookup("SWITCHBOARD_LOG_MODULE")
            .map(|v| flag(&v))
            .unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color,
            timestamps,
            module_path,
        }
    }

    /// Override the level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Level filter: `RUST_LOG` if set, the configured level otherwise.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.directive()))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.module_path)
            .with_ansi(self.color && self.format != Format::Json);

        match (self.format, self.timestamps) {
            (Format::Json, true) => base.json().with_timer(UtcTime).boxed(),
            (Format::Json, false) => base.json().without_time().boxed(),
            (Format::Compact, true) => base.compact().with_timer(LocalTime::SHORT).boxed(),
            (Format::Compact, false) => base.compact().without_time().boxed(),
            (Format::Pretty, true) => base.pretty().with_timer(LocalTime::FULL).boxed(),
            (Format::Pretty, false) => base.pretty().without_time().boxed(),
        }
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Local wall-clock timestamps.
#[derive(Debug, Clone, Copy)]
struct LocalTime(&'static str);

impl LocalTime {
    const FULL: LocalTime = LocalTime("%Y-%m-%d %H:%M:%S%.3f");
    const SHORT: LocalTime = LocalTime("%H:%M:%S%.3f");
}

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format(self.0))
    }
}

/// RFC 3339 UTC timestamps for JSON output.
#[derive(Debug, Clone, Copy)]
struct UtcTime;

impl FormatTime for UtcTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Utc::now().to_rfc3339())
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Install the global subscriber from the environment.
pub fn init() -> Result<(), TryInitError> {
    init_with(config())
}

/// Install the global subscriber with an explicit configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init_with(config: &LogConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(config.layer())
        .with(config.filter())
        .try_init()?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        "Logging initialised"
    );
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
