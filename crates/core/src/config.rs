use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Default database file name inside the data directory
pub const DEFAULT_DATABASE_NAME: &str = "knowledgebase.sqlite";

/// Hard ceiling on results a single search may return
pub const MAX_SEARCH_RESULTS: usize = 50;

/// Root configuration structure for kbase.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Storage location and connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Ranking and result-size settings for search
    #[serde(default)]
    pub search: SearchConfig,

    /// Logging output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. Defaults to `<data dir>/kbase/knowledgebase.sqlite`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How long a connection waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Put the database in WAL journal mode when it is opened
    #[serde(default = "default_true")]
    pub wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: None, busy_timeout_ms: default_busy_timeout_ms(), wal: true }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

/// Search ranking configuration
///
/// The combined score of a hit is `relevance * rank_weight + importance * importance_weight`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_rank_weight")]
    pub rank_weight: f64,

    #[serde(default = "default_importance_weight")]
    pub importance_weight: f64,

    /// Result count used when a search does not ask for one
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rank_weight: default_rank_weight(),
            importance_weight: default_importance_weight(),
            default_max_results: default_max_results(),
        }
    }
}

fn default_rank_weight() -> f64 {
    0.6
}

fn default_importance_weight() -> f64 {
    0.4
}

fn default_max_results() -> usize {
    5
}

impl SearchConfig {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, value) in [("rank_weight", self.rank_weight), ("importance_weight", self.importance_weight)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::WeightOutOfRange { name, value });
            }
        }

        let sum = self.rank_weight + self.importance_weight;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(ConfigError::WeightsDoNotSumToOne(sum));
        }

        if self.default_max_results == 0 || self.default_max_results > MAX_SEARCH_RESULTS {
            return Err(ConfigError::InvalidDefaultMaxResults {
                value: self.default_max_results,
                max: MAX_SEARCH_RESULTS,
            });
        }

        Ok(())
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `KBASE_LOG` / `RUST_LOG` are unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for stderr: `pretty`, `json` or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default)]
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format(), file: FileLoggingConfig::default() }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

/// `[logging.file]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    /// Also write JSON logs to a daily rolling file
    #[serde(default)]
    pub enabled: bool,

    /// Directory for log files (default: `<data dir>/kbase/logs`)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    ///
    /// Environment overrides are applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                tracing::debug!("Loading config from {}", p.display());
                Self::from_file(p)?
            }
            _ => {
                tracing::debug!("No config file, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `KBASE_DATABASE_PATH` and `KBASE_DATABASE_NAME` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| env::var(key).ok());
    }

    /// Apply overrides read through `lookup`
    ///
    /// A non-empty `KBASE_DATABASE_PATH` wins; otherwise a non-empty
    /// `KBASE_DATABASE_NAME` is placed in the platform data directory.
    pub fn apply_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("KBASE_DATABASE_PATH")
            && !path.is_empty()
        {
            self.database.path = Some(PathBuf::from(path));
        } else if let Some(name) = lookup("KBASE_DATABASE_NAME")
            && !name.is_empty()
            && let Some(dir) = default_data_dir()
        {
            self.database.path = Some(dir.join(name));
        }
    }

    /// Resolve the database path, falling back to the platform data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        default_data_dir()
            .map(|dir| dir.join(DEFAULT_DATABASE_NAME))
            .ok_or_else(|| ConfigError::NoDataDir(PathBuf::from(DEFAULT_DATABASE_NAME)).into())
    }

    fn validate(&self) -> Result<()> {
        self.search.validate()?;
        if crate::logging::LogFormat::parse_str(&self.logging.format).is_none() {
            return Err(ConfigError::InvalidLogFormat(self.logging.format.clone()).into());
        }
        Ok(())
    }

    /// Get example configuration (as a string)
    pub fn example() -> &'static str {
        r#"# kbase configuration
# Every key is optional; the values below are the defaults.

[database]
# path = "/home/me/.local/share/kbase/knowledgebase.sqlite"
busy_timeout_ms = 5000
wal = true

[search]
# Combined score = relevance * rank_weight + importance * importance_weight.
# The two weights must add up to 1.0.
rank_weight = 0.6
importance_weight = 0.4
default_max_results = 5

[logging]
level = "warn"
# "pretty", "json" or "compact"
format = "compact"

[logging.file]
enabled = false
# directory = "/var/log/kbase"
"#
    }
}

/// `<platform data dir>/kbase`
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("kbase"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(config.database.path.is_none());
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert!(config.database.wal);
        assert_eq!(config.search.rank_weight, 0.6);
        assert_eq!(config.search.importance_weight, 0.4);
        assert_eq!(config.search.default_max_results, 5);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "compact");
        assert!(!config.logging.file.enabled);
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.search.default_max_results, 5);
    }

    #[test]
    fn test_config_example_parses() {
        let config = Config::from_toml_str(Config::example()).unwrap();
        assert_eq!(config.search.rank_weight, 0.6);
        assert!(config.database.wal);
    }

    #[test]
    fn test_config_from_toml_str() {
        let toml = r#"
[database]
path = "/tmp/kb.sqlite"
busy_timeout_ms = 250
wal = false

[search]
rank_weight = 0.5
importance_weight = 0.5
default_max_results = 10

[logging]
level = "debug"
format = "json"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/kb.sqlite")));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert!(!config.database.wal);
        assert_eq!(config.search.rank_weight, 0.5);
        assert_eq!(config.search.default_max_results, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/kb.sqlite"));
    }

    #[test]
    fn test_config_rejects_weights_not_summing_to_one() {
        let toml = r#"
[search]
rank_weight = 0.7
importance_weight = 0.7
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("must equal 1.0"));
    }

    #[test]
    fn test_config_rejects_weight_out_of_range() {
        let toml = r#"
[search]
rank_weight = 1.5
importance_weight = -0.5
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("rank_weight must be between 0 and 1"));
    }

    #[test]
    fn test_config_rejects_default_max_results() {
        let err = Config::from_toml_str("[search]\ndefault_max_results = 51\n").unwrap_err();
        assert!(err.to_string().contains("default_max_results"));

        let err = Config::from_toml_str("[search]\ndefault_max_results = 0\n").unwrap_err();
        assert!(err.to_string().contains("default_max_results"));
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        assert!(Config::from_toml_str("[database]\nurl = \"postgres://\"\n").is_err());
    }

    #[test]
    fn test_config_rejects_bad_log_format() {
        let err = Config::from_toml_str("[logging]\nformat = \"xml\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid log format"));
    }

    #[test]
    fn test_config_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("kbase.toml");
        std::fs::write(&path, "[search]\ndefault_max_results = 7\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.search.default_max_results, 7);
    }

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_env_database_path_wins_over_name() {
        let mut config = Config::default();
        config.apply_overrides_with(lookup_from(&[
            ("KBASE_DATABASE_PATH", "/tmp/explicit.sqlite"),
            ("KBASE_DATABASE_NAME", "other.sqlite"),
        ]));
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/explicit.sqlite")));
    }

    #[test]
    fn test_env_database_name_uses_data_dir() {
        let mut config = Config::default();
        config.apply_overrides_with(lookup_from(&[
            ("KBASE_DATABASE_PATH", ""),
            ("KBASE_DATABASE_NAME", "other.sqlite"),
        ]));
        assert_eq!(config.database.path, default_data_dir().map(|dir| dir.join("other.sqlite")));
    }

    #[test]
    fn test_env_overrides_absent_keep_config() {
        let mut config = Config::from_toml_str("[database]\npath = \"/tmp/kb.sqlite\"\n").unwrap();
        config.apply_overrides_with(lookup_from(&[]));
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/kb.sqlite")));
    }

    #[test]
    fn test_config_load_missing_file_uses_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config::load(Some(&temp.path().join("missing.toml"))).unwrap();
        assert_eq!(config.search.default_max_results, 5);
    }
}
