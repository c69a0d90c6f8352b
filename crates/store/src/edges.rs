//! Directed edges between memory nodes
//!
//! Endpoint existence and edge uniqueness are left to the foreign and primary
//! keys; a failed insert is classified instead of checked for up front.

use crate::connection::ConstraintViolation;
use crate::model::format_timestamp;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

/// Result of inserting a batch of edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkOutcome {
    Linked(usize),
    /// An endpoint does not exist
    InvalidIds,
    /// One of the edges is already present
    AlreadyLinked,
}

/// Insert `source -> target` for every target with a shared timestamp
///
/// Stops at the first constraint violation. The caller owns the transaction
/// and must drop it without committing on anything but `Linked`.
pub(crate) fn insert(
    conn: &Connection, source: Uuid, targets: &[Uuid], now: DateTime<Utc>,
) -> rusqlite::Result<LinkOutcome> {
    let created = format_timestamp(now);
    let source = source.to_string();
    let mut stmt = conn.prepare_cached(
        "INSERT INTO memory_edges (source_memory_node_id, target_memory_node_id, created) VALUES (?1, ?2, ?3)",
    )?;

    for target in targets {
        if let Err(err) = stmt.execute(params![source, target.to_string(), created]) {
            return match ConstraintViolation::classify(&err) {
                Some(ConstraintViolation::ForeignKey) => {
                    debug!(%source, %target, "edge endpoint missing");
                    Ok(LinkOutcome::InvalidIds)
                }
                Some(v) if v.is_duplicate() => {
                    debug!(%source, %target, "edge already exists");
                    Ok(LinkOutcome::AlreadyLinked)
                }
                _ => Err(err),
            };
        }
    }

    Ok(LinkOutcome::Linked(targets.len()))
}
