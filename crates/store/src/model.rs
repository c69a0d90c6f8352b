//! Records and requests exchanged with the store

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Importance assigned when a caller does not provide one
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// A memory node joined with its topic name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub topic: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub importance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outdated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outdated_reason: Option<String>,
}

impl Memory {
    pub fn is_outdated(&self) -> bool {
        self.outdated.is_some()
    }

    /// Build from a row selected with [`crate::schema::MEMORY_COLUMNS`]
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_uuid(0, &row.get::<_, String>(0)?)?,
            created: parse_timestamp(1, &row.get::<_, String>(1)?)?,
            topic: row.get(2)?,
            content: row.get(3)?,
            context: row.get(4)?,
            importance: row.get(5)?,
            outdated: row
                .get::<_, Option<String>>(6)?
                .map(|value| parse_timestamp(6, &value))
                .transpose()?,
            outdated_reason: row.get(7)?,
        })
    }
}

/// A memory together with the memories it links to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryWithLinks {
    #[serde(flatten)]
    pub memory: Memory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_memories: Option<Vec<Memory>>,
}

/// Id and content of a freshly created memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedMemory {
    pub id: Uuid,
    pub content: String,
}

/// A batch of memories sharing topic, context and importance
#[derive(Debug, Clone, Default)]
pub struct NewMemories {
    pub topic: String,
    pub contents: Vec<String>,
    pub context: Option<String>,
    /// Defaults to [`DEFAULT_IMPORTANCE`]
    pub importance: Option<f64>,
    /// Existing memory every new memory gets an edge from
    pub link_to: Option<Uuid>,
}

impl NewMemories {
    pub fn new(topic: impl Into<String>, contents: Vec<String>) -> Self {
        Self { topic: topic.into(), contents, ..Default::default() }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn linked_to(mut self, id: Uuid) -> Self {
        self.link_to = Some(id);
        self
    }
}

/// Outcome of marking a memory outdated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutdatedStatus {
    Marked,
    AlreadyOutdated,
}

/// Full-text search over memory content
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Alternatives; a memory matching any of them is a hit
    pub phrases: Vec<String>,
    /// Restrict hits to these topics when non-empty
    pub topics: Vec<String>,
    /// Falls back to the store's configured default
    pub max_results: Option<usize>,
    pub exclude_outdated: bool,
}

impl SearchRequest {
    pub fn new(phrases: Vec<String>) -> Self {
        Self { phrases, ..Default::default() }
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn excluding_outdated(mut self) -> Self {
        self.exclude_outdated = true;
        self
    }
}

/// Weights blending text relevance and importance into one score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWeights {
    pub rank: f64,
    pub importance: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self { rank: 0.6, importance: 0.4 }
    }
}

/// Settings a [`crate::MemoryStore`] is opened with
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub wal: bool,
    pub weights: SearchWeights,
    pub default_max_results: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            wal: true,
            weights: SearchWeights::default(),
            default_max_results: 5,
        }
    }
}

impl From<&kbase_core::Config> for StoreOptions {
    fn from(config: &kbase_core::Config) -> Self {
        Self {
            busy_timeout: Duration::from_millis(config.database.busy_timeout_ms),
            wal: config.database.wal,
            weights: SearchWeights {
                rank: config.search.rank_weight,
                importance: config.search.importance_weight,
            },
            default_max_results: config.search.default_max_results,
        }
    }
}

/// Storage form of a timestamp; fixed precision keeps text order chronological
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
///
/// Rows written before the RFC 3339 format may carry SQLite's
/// `YYYY-MM-DD HH:MM:SS[.fff]` form; those are read as UTC.
pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").map(|ts| ts.and_utc()))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

pub(crate) fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}
