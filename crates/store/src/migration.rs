//! Schema migration logic for the knowledge store
//!
//! Tracks applied generations in `schema_version` and applies the pending ones
//! in order, each inside its own transaction.

use crate::error::{Error, Result};
use crate::schema::{
    SCHEMA_V1_SQL, SCHEMA_V2_SQL, SCHEMA_V3_SQL, SCHEMA_V4_SQL, SCHEMA_VERSION, SCHEMA_VERSION_SQL,
};
use rusqlite::{Connection, params};
use tracing::{debug, info, trace};

/// Ordered list of schema generations
const MIGRATIONS: [(i32, &str); 4] = [
    (1, SCHEMA_V1_SQL),
    (2, SCHEMA_V2_SQL),
    (3, SCHEMA_V3_SQL),
    (4, SCHEMA_V4_SQL),
];

/// Manages schema migrations for the knowledge store
pub struct MigrationManager;

impl MigrationManager {
    /// Get the current schema version from the database
    ///
    /// Returns 0 if the schema_version table doesn't exist or is empty.
    pub fn get_current_version(conn: &Connection) -> Result<i32> {
        let table_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(format!("Failed to check schema_version table: {e}")))?;

        if !table_exists {
            trace!("schema_version table does not exist, returning version 0");
            return Ok(0);
        }

        let version: Option<i32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .map_err(|e| Error::database(format!("Failed to query schema version: {e}")))?;

        Ok(version.unwrap_or(0))
    }

    /// Apply pending migrations up to SCHEMA_VERSION
    ///
    /// This is idempotent - running it multiple times is safe.
    pub fn migrate(conn: &mut Connection) -> Result<()> {
        Self::migrate_to(conn, SCHEMA_VERSION)
    }

    /// Apply pending migrations up to and including `target`
    pub fn migrate_to(conn: &mut Connection, target: i32) -> Result<()> {
        if target > SCHEMA_VERSION {
            return Err(Error::database(format!(
                "Unknown schema version {target}, latest is {SCHEMA_VERSION}"
            )));
        }

        let current_version = Self::get_current_version(conn)?;
        debug!("Current schema version: {}, target: {}", current_version, target);

        if current_version > SCHEMA_VERSION {
            return Err(Error::database(format!(
                "Database schema version {current_version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }

        if current_version >= target {
            trace!("Schema is up to date, no migration needed");
            return Ok(());
        }

        info!("Migrating schema from version {} to {}", current_version, target);

        conn.execute_batch(SCHEMA_VERSION_SQL)
            .map_err(|e| Error::database(format!("Failed to create schema_version table: {e}")))?;

        // Table rebuilds drop tables that are still referenced. The pragma is a
        // no-op inside a transaction, so it is toggled around the whole run.
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        let result = Self::apply_pending(conn, current_version, target);
        let check = result.and_then(|()| Self::check_foreign_keys(conn));
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        check?;

        info!("Schema migration complete");
        Ok(())
    }

    fn apply_pending(conn: &mut Connection, current_version: i32, target: i32) -> Result<()> {
        for (version, sql) in MIGRATIONS {
            if version <= current_version || version > target {
                continue;
            }
            Self::apply_migration(conn, version, sql)?;
        }
        Ok(())
    }

    fn apply_migration(conn: &mut Connection, version: i32, sql: &str) -> Result<()> {
        debug!("Applying v{} migration", version);

        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Failed to apply v{version} schema: {e}")))?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", params![version])?;
        tx.commit()?;

        trace!("v{} migration applied successfully", version);
        Ok(())
    }

    fn check_foreign_keys(conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let violations: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<_, _>>()?;

        if let Some(table) = violations.first() {
            return Err(Error::database(format!(
                "Migration left {} foreign key violation(s), first in table {table}",
                violations.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{Connection, OptionalExtension};

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn column_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})")).unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    /// Database in the oldest generation with one replaced memory and one link.
    fn seed_v1(conn: &mut Connection) {
        MigrationManager::migrate_to(conn, 1).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO topics (id, created, name) VALUES ('t1', '2024-01-01T00:00:00.000000Z', 'rust');
            INSERT INTO memory_contexts (id, created, value) VALUES ('c1', '2024-01-01T00:00:00.000000Z', 'from a code review');
            INSERT INTO memories (id, created, topic_id, context_id, content, replaced_by_memory_id)
                VALUES ('m1', '2024-01-01T00:00:01.000000Z', 't1', 'c1', 'borrowck is strict', NULL);
            INSERT INTO memories (id, created, topic_id, context_id, content, replaced_by_memory_id)
                VALUES ('m2', '2024-01-01T00:00:02.000000Z', 't1', NULL, 'lifetimes are elided', NULL);
            INSERT INTO memories (id, created, topic_id, context_id, content, replaced_by_memory_id)
                VALUES ('m0', '2024-01-01T00:00:00.500000Z', 't1', NULL, 'old fact', 'm2');
            INSERT INTO memory_links (from_memory_id, to_memory_id, created)
                VALUES ('m2', 'm1', '2024-01-01T00:00:03.000000Z');
            INSERT INTO memory_search (memory_id, content, context) VALUES ('m1', 'borrowck is strict', 'from a code review');
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_get_current_version_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        let version = MigrationManager::get_current_version(&conn).unwrap();
        assert_eq!(version, 0);
    }

    #[test]
    fn test_migrate_applies_schema_and_sets_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::migrate(&mut conn).unwrap();

        let version = MigrationManager::get_current_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        assert!(table_exists(&conn, "topics"));
        assert!(table_exists(&conn, "memory_nodes"));
        assert!(table_exists(&conn, "memory_edges"));
        assert!(table_exists(&conn, "memory_search"));
        assert!(!table_exists(&conn, "memories"));
        assert!(!table_exists(&conn, "memory_links"));
        assert!(!table_exists(&conn, "memory_contexts"));

        let columns = column_names(&conn, "memory_nodes");
        assert!(columns.contains(&"context".to_string()));
        assert!(columns.contains(&"importance".to_string()));
        assert!(!columns.contains(&"context_id".to_string()));
    }

    #[test]
    fn test_migrate_records_every_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::migrate(&mut conn).unwrap();

        let versions: Vec<i32> = conn
            .prepare("SELECT version FROM schema_version ORDER BY version")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(versions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();

        MigrationManager::migrate(&mut conn).unwrap();
        let version1 = MigrationManager::get_current_version(&conn).unwrap();

        MigrationManager::migrate(&mut conn).unwrap();
        let version2 = MigrationManager::get_current_version(&conn).unwrap();

        assert_eq!(version1, version2);
        assert_eq!(version2, SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_restores_foreign_keys() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        MigrationManager::migrate(&mut conn).unwrap();

        let enabled: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_migrate_to_unknown_version_fails() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(MigrationManager::migrate_to(&mut conn, SCHEMA_VERSION + 1).is_err());
    }

    #[test]
    fn test_migrate_from_v1_preserves_data() {
        let mut conn = Connection::open_in_memory().unwrap();
        seed_v1(&mut conn);
        MigrationManager::migrate(&mut conn).unwrap();

        let (content, context, importance, outdated): (String, Option<String>, f64, Option<String>) = conn
            .query_row(
                "SELECT content, context, importance, outdated FROM memory_nodes WHERE id = 'm1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(content, "borrowck is strict");
        assert_eq!(context.as_deref(), Some("from a code review"));
        assert_eq!(importance, 0.5);
        assert!(outdated.is_none());

        let context: Option<String> = conn
            .query_row("SELECT context FROM memory_nodes WHERE id = 'm2'", [], |row| row.get(0))
            .unwrap();
        assert!(context.is_none());
    }

    #[test]
    fn test_migrate_converts_replacement_to_edge_and_outdated() {
        let mut conn = Connection::open_in_memory().unwrap();
        seed_v1(&mut conn);
        MigrationManager::migrate(&mut conn).unwrap();

        let (outdated, reason): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT outdated, outdated_reason FROM memory_nodes WHERE id = 'm0'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(outdated.as_deref(), Some("2024-01-01T00:00:02.000000Z"));
        assert_eq!(reason.as_deref(), Some("Replaced by memory m2."));

        let edge: Option<String> = conn
            .query_row(
                "SELECT created FROM memory_edges WHERE source_memory_node_id = 'm0' AND target_memory_node_id = 'm2'",
                [],
                |row| row.get(0),
            )
            .optional()
            .unwrap();
        assert!(edge.is_some());
    }

    #[test]
    fn test_migrate_reverses_link_direction() {
        let mut conn = Connection::open_in_memory().unwrap();
        seed_v1(&mut conn);
        MigrationManager::migrate(&mut conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_edges WHERE source_memory_node_id = 'm1' AND target_memory_node_id = 'm2'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM memory_edges", [], |row| row.get(0)).unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_migrate_rebuilds_search_index() {
        let mut conn = Connection::open_in_memory().unwrap();
        seed_v1(&mut conn);
        MigrationManager::migrate(&mut conn).unwrap();

        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM memory_search", [], |row| row.get(0)).unwrap();
        assert_eq!(rows, 3);

        let hit: String = conn
            .query_row(
                "SELECT memory_node_id FROM memory_search WHERE memory_search MATCH 'memory_content : lifetimes'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hit, "m2");
    }
}
