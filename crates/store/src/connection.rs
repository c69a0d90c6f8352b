//! Connection factory and constraint classification
//!
//! Every store operation gets its own connection. Foreign keys are enforced on
//! each one; a busy timeout makes concurrent writers wait on the SQLite lock.

use crate::error::{Error, Result};
use crate::migration::MigrationManager;
use rusqlite::{ErrorCode, ffi};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_rusqlite::Connection;
use tracing::{debug, instrument, trace};

/// Kind of constraint a failed statement tripped over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    /// A referenced row does not exist
    ForeignKey,
    /// The primary key is already taken
    PrimaryKey,
    /// A unique index is already taken
    Unique,
}

impl ConstraintViolation {
    /// Classify a SQLite error by its extended result code
    ///
    /// Returns `None` for anything that is not one of the known constraint
    /// violations; callers treat those as fatal.
    pub fn classify(err: &rusqlite::Error) -> Option<Self> {
        match err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                match e.extended_code {
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Self::ForeignKey),
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some(Self::PrimaryKey),
                    ffi::SQLITE_CONSTRAINT_UNIQUE => Some(Self::Unique),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Whether the violation means the row already exists
    pub fn is_duplicate(self) -> bool {
        matches!(self, Self::PrimaryKey | Self::Unique)
    }
}

/// Opens connections to one SQLite file
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self { path: path.into(), busy_timeout }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file if needed, set the journal mode and apply pending migrations
    #[instrument(skip(self), fields(db_path = %self.path.display()))]
    pub async fn initialize(&self, wal: bool) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = self.connect().await?;
        conn.call(move |conn| {
            if wal {
                let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
                trace!("journal_mode = {}", mode);
            }

            debug!("Running migrations");
            MigrationManager::migrate(conn).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            trace!("Migrations complete");
            Ok::<(), rusqlite::Error>(())
        })
        .await
        .map_err(|e| Error::database(format!("Migration failed: {e}")))?;

        Ok(())
    }

    /// Open a fresh connection with the per-connection pragmas applied
    pub async fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .await
            .map_err(|e| Error::database(format!("Failed to open database: {e}")))?;

        let busy_timeout = self.busy_timeout;
        conn.call(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;

        Ok(conn)
    }
}
