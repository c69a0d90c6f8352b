use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kbase-core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types shared by the kbase crates
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error for file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging setup errors
    #[error("logging error: {0}")]
    Logging(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(String),

    /// A search weight is outside [0, 1]
    #[error("{name} must be between 0 and 1, got {value}")]
    WeightOutOfRange { name: &'static str, value: f64 },

    /// Rank and importance weights must add up to one
    #[error("rank_weight + importance_weight must equal 1.0, got {0}")]
    WeightsDoNotSumToOne(f64),

    /// Default result count outside the accepted range
    #[error("default_max_results must be between 1 and {max}, got {value}")]
    InvalidDefaultMaxResults { value: usize, max: usize },

    /// Unknown log format
    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    /// Data directory could not be resolved
    #[error("could not determine a data directory for {0}")]
    NoDataDir(PathBuf),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlParse(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.into())
    }
}
