//! Memory repository: create, fetch and the outdated transition

use crate::edges::{self, LinkOutcome};
use crate::model::{
    CreatedMemory, DEFAULT_IMPORTANCE, Memory, MemoryWithLinks, NewMemories, OutdatedStatus, format_timestamp,
};
use crate::schema::MEMORY_COLUMNS;
use crate::topics;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, trace};
use uuid::Uuid;

/// Result of a batch create
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CreateOutcome {
    Created(Vec<CreatedMemory>),
    /// `link_to` names a memory that does not exist; nothing was written
    InvalidLinkTarget(Uuid),
}

/// Checks that need no storage access
pub(crate) fn validate_new(batch: &NewMemories) -> Result<(), String> {
    if batch.topic.trim().is_empty() {
        return Err("topic must not be empty.".to_string());
    }
    if batch.contents.iter().any(|content| content.trim().is_empty()) {
        return Err("content must not be empty.".to_string());
    }
    if let Some(importance) = batch.importance
        && !(0.0..=1.0).contains(&importance)
    {
        return Err("importance must be between 0 and 1.".to_string());
    }
    Ok(())
}

/// Insert a validated batch in one transaction
///
/// Topic, nodes, search rows and optional edges commit together or not at all.
pub(crate) fn create(conn: &mut Connection, batch: NewMemories, now: DateTime<Utc>) -> rusqlite::Result<CreateOutcome> {
    let tx = conn.transaction()?;
    let topic_id = topics::get_or_create(&tx, &batch.topic, now)?;
    let context = batch.context.filter(|context| !context.is_empty());
    let importance = batch.importance.unwrap_or(DEFAULT_IMPORTANCE);
    let created = format_timestamp(now);

    let mut memories = Vec::with_capacity(batch.contents.len());
    {
        let mut insert_node = tx.prepare_cached(
            "INSERT INTO memory_nodes (id, created, topic_id, content, context, importance) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut insert_search = tx.prepare_cached(
            "INSERT INTO memory_search (memory_node_id, memory_content, memory_context) VALUES (?1, ?2, ?3)",
        )?;

        for content in batch.contents {
            let id = Uuid::now_v7();
            insert_node.execute(params![id.to_string(), created, topic_id, content, context, importance])?;
            insert_search.execute(params![id.to_string(), content, context])?;
            trace!(%id, "inserted memory node");
            memories.push(CreatedMemory { id, content });
        }
    }

    if let Some(source) = batch.link_to {
        let targets: Vec<Uuid> = memories.iter().map(|memory| memory.id).collect();
        match edges::insert(&tx, source, &targets, now)? {
            LinkOutcome::Linked(count) => debug!(%source, count, "linked new memories"),
            LinkOutcome::InvalidIds | LinkOutcome::AlreadyLinked => {
                debug!(%source, "link target missing, rolling back create");
                return Ok(CreateOutcome::InvalidLinkTarget(source));
            }
        }
    }

    tx.commit()?;
    Ok(CreateOutcome::Created(memories))
}

/// Read one memory, optionally with the memories it links to
pub(crate) fn fetch(conn: &Connection, id: Uuid, include_linked: bool) -> rusqlite::Result<Option<MemoryWithLinks>> {
    let id = id.to_string();
    let memory = conn
        .prepare_cached(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_nodes mn JOIN topics t ON t.id = mn.topic_id WHERE mn.id = ?1"
        ))?
        .query_row(params![id], Memory::from_row)
        .optional()?;

    let Some(memory) = memory else {
        return Ok(None);
    };

    let linked_memories = if include_linked {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {MEMORY_COLUMNS}
             FROM memory_edges e
             JOIN memory_nodes mn ON mn.id = e.target_memory_node_id
             JOIN topics t ON t.id = mn.topic_id
             WHERE e.source_memory_node_id = ?1
             ORDER BY mn.created, mn.id"
        ))?;
        let linked = stmt.query_map(params![id], Memory::from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Some(linked)
    } else {
        None
    };

    Ok(Some(MemoryWithLinks { memory, linked_memories }))
}

/// Move a memory from current to outdated, at most once
///
/// Returns `None` when the memory does not exist. The update is conditional on
/// the node still being current, so of two racing callers only one wins and
/// the first reason is kept.
pub(crate) fn mark_outdated(
    conn: &Connection, id: Uuid, reason: &str, now: DateTime<Utc>,
) -> rusqlite::Result<Option<OutdatedStatus>> {
    let id = id.to_string();
    let outdated: Option<Option<String>> = conn
        .prepare_cached("SELECT outdated FROM memory_nodes WHERE id = ?1")?
        .query_row(params![id], |row| row.get(0))
        .optional()?;

    match outdated {
        None => return Ok(None),
        Some(Some(_)) => return Ok(Some(OutdatedStatus::AlreadyOutdated)),
        Some(None) => {}
    }

    let updated = conn
        .prepare_cached(
            "UPDATE memory_nodes SET outdated = ?1, outdated_reason = ?2 WHERE id = ?3 AND outdated IS NULL",
        )?
        .execute(params![format_timestamp(now), reason, id])?;

    Ok(Some(if updated == 0 { OutdatedStatus::AlreadyOutdated } else { OutdatedStatus::Marked }))
}
