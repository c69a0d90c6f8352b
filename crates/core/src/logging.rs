//! Logging setup on top of the tracing ecosystem.
//!
//! All output goes to stderr; stdout is reserved for operation payloads so that
//! the `serve` loop and subcommands can be piped.
//!
//! # Environment Variables
//!
//! - `KBASE_LOG`: Filter directive (like `RUST_LOG`), e.g., `kbase_store=debug`
//! - `KBASE_LOG_FORMAT`: Output format for stderr: `pretty`, `json`, `compact`
//! - `KBASE_LOG_DIR`: Directory for the rolling log file (when file logging is enabled)
//!
//! # Example
//!
//! ```no_run
//! use kbase_core::logging;
//! use kbase_core::config::Config;
//!
//! let config = Config::default();
//! let _guard = logging::init_logging(Some(config.logging.into()))?;
//! # Ok::<(), kbase_core::Error>(())
//! ```

use crate::Error;
use crate::config::{LoggingConfig as ConfigLoggingConfig, default_data_dir};
use std::env;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format for stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Pretty, human-readable output with colors
    Pretty,
    /// JSON output (one line per event)
    Json,
    /// Compact, single-line output
    #[default]
    Compact,
}

impl LogFormat {
    /// All available log formats.
    pub const VALUES: &[LogFormat] = &[LogFormat::Pretty, LogFormat::Json, LogFormat::Compact];

    /// Parse a log format from a string.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }

    /// Get the string representation of this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

/// Runtime logging settings, bridged from the `[logging]` config section.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive for stderr output.
    pub level: String,
    /// Output format for stderr.
    pub format: LogFormat,
    /// Directory for the rolling JSON log file, when file logging is on.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: LogFormat::default(), file_dir: None }
    }
}

impl From<ConfigLoggingConfig> for LoggingConfig {
    fn from(config: ConfigLoggingConfig) -> Self {
        let format = LogFormat::parse_str(&config.format).unwrap_or_default();
        let file_dir = if config.file.enabled {
            config
                .file
                .directory
                .or_else(|| default_data_dir().map(|dir| dir.join("logs")))
        } else {
            None
        };

        Self { level: config.level, format, file_dir }
    }
}

impl LoggingConfig {
    /// Set the log level.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Build an EnvFilter from this config and environment variables.
    fn build_env_filter(&self) -> EnvFilter {
        let filter = env::var("KBASE_LOG")
            .ok()
            .or_else(|| env::var("RUST_LOG").ok())
            .unwrap_or_else(|| self.level.clone());

        EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    /// Detect if stderr is a TTY for colored output.
    fn is_tty() -> bool {
        atty::is(atty::Stream::Stderr)
    }

    /// Determine the format for stderr output; `KBASE_LOG_FORMAT` wins over config.
    fn detect_format(&self) -> LogFormat {
        if let Ok(fmt_str) = env::var("KBASE_LOG_FORMAT")
            && let Some(fmt) = LogFormat::parse_str(&fmt_str)
        {
            return fmt;
        }

        self.format
    }

    /// Resolve the log directory; `KBASE_LOG_DIR` wins over config.
    fn log_dir(&self) -> Option<PathBuf> {
        let dir = self.file_dir.as_ref()?;
        Some(env::var("KBASE_LOG_DIR").map(PathBuf::from).unwrap_or_else(|_| dir.clone()))
    }
}

/// Initialize the global tracing subscriber.
///
/// Sets up an env-based filter, formatted stderr output and, when a log
/// directory is configured, a daily rolling JSON file. The returned guard
/// flushes the file writer on drop and must be kept alive by the caller.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<Option<WorkerGuard>, Error> {
    let config = config.unwrap_or_default();
    let env_filter = config.build_env_filter();
    let format = config.detect_format();
    let ansi = LoggingConfig::is_tty();

    let registry = Registry::default().with(env_filter);

    if let Some(log_dir) = config.log_dir() {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| Error::Logging(format!("Failed to create log directory: {}", e)))?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "kbase.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let result = match format {
            LogFormat::Pretty => registry
                .with(fmt::layer().pretty().with_writer(io::stderr).with_ansi(ansi))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(io::stderr))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_writer(io::stderr).with_ansi(ansi))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init(),
        };
        result.map_err(|e| Error::Logging(e.to_string()))?;

        return Ok(Some(guard));
    }

    let result = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(io::stderr).with_ansi(ansi))
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(io::stderr)).try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(io::stderr).with_ansi(ansi))
            .try_init(),
    };
    result.map_err(|e| Error::Logging(e.to_string()))?;

    Ok(None)
}

/// Shorten free text before it goes into a log line.
pub fn truncate_for_log(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }

    let mut truncated = content.chars().take(max_chars).collect::<String>();
    truncated.push_str(&format!("... ({} total chars)", total));
    truncated
}
