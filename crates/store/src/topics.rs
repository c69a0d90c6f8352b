//! Topic registry

use crate::model::format_timestamp;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::trace;
use uuid::Uuid;

/// Resolve a topic name to its id, creating the topic on first use
///
/// The insert is a no-op when the name already exists, so a concurrent writer
/// that wins the race simply has its id returned by the follow-up lookup.
pub(crate) fn get_or_create(conn: &Connection, name: &str, now: DateTime<Utc>) -> rusqlite::Result<String> {
    let inserted = conn
        .prepare_cached("INSERT INTO topics (id, created, name) VALUES (?1, ?2, ?3) ON CONFLICT(name) DO NOTHING")?
        .execute(params![Uuid::now_v7().to_string(), format_timestamp(now), name])?;
    if inserted > 0 {
        trace!(topic = name, "created topic");
    }

    conn.prepare_cached("SELECT id FROM topics WHERE name = ?1")?
        .query_row(params![name], |row| row.get(0))
}

/// All topic names in name order
pub(crate) fn list(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached("SELECT name FROM topics ORDER BY name")?;
    let names = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationManager;

    fn migrated() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::migrate(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_get_or_create_reuses_existing_topic() {
        let conn = migrated();
        let first = get_or_create(&conn, "rust", Utc::now()).unwrap();
        let second = get_or_create(&conn, "rust", Utc::now()).unwrap();
        assert_eq!(first, second);

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_list_orders_by_name() {
        let conn = migrated();
        for name in ["sqlite", "async", "rust"] {
            get_or_create(&conn, name, Utc::now()).unwrap();
        }
        assert_eq!(list(&conn).unwrap(), vec!["async", "rust", "sqlite"]);
    }

    #[test]
    fn test_list_empty() {
        assert!(list(&migrated()).unwrap().is_empty());
    }
}
