//! Shared configuration, logging and error types for the kbase crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, DatabaseConfig, FileLoggingConfig, LoggingConfig, MAX_SEARCH_RESULTS, SearchConfig};
pub use error::{ConfigError, Error, Result};
pub use logging::{LogFormat, init_logging};
