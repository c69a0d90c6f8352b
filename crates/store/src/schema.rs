//! SQLite schema for the knowledge store
//!
//! Every schema generation the store has shipped is kept here as a forward-only
//! script. A fresh database runs all of them in order; an older database runs
//! the ones it is missing. The end state is the current data model:
//!
//! - `topics`: named groups of memories
//! - `memory_nodes`: memories, with inline context, importance and the outdated pair
//! - `memory_edges`: directed links between memory nodes
//! - `memory_search`: FTS5 index mirroring node content and context

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 4;

/// SQL to create the schema version table
pub const SCHEMA_VERSION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// v1: memories with a separate context table, a replaced-by pointer and plain links.
pub const SCHEMA_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS memory_contexts (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    topic_id TEXT NOT NULL REFERENCES topics(id),
    context_id TEXT REFERENCES memory_contexts(id),
    content TEXT NOT NULL,
    replaced_by_memory_id TEXT REFERENCES memories(id)
);

CREATE TABLE IF NOT EXISTS memory_links (
    from_memory_id TEXT NOT NULL REFERENCES memories(id),
    to_memory_id TEXT NOT NULL REFERENCES memories(id),
    created TEXT NOT NULL,
    PRIMARY KEY (from_memory_id, to_memory_id)
);

CREATE VIRTUAL TABLE IF NOT EXISTS memory_search USING fts5(
    memory_id UNINDEXED,
    content,
    context,
    tokenize='porter unicode61 remove_diacritics 2'
);
"#;

/// v2: memories become memory nodes with an outdated marker; links become edges.
///
/// A replaced-by pointer turns into an edge from the replaced node to its
/// replacement, and the replaced node is marked outdated at the time the
/// replacement was created. Old links pointed from the newer memory to the
/// older one; edges point from the older (source) to the newer (target).
/// The search index is derived data and is rebuilt from the nodes.
pub const SCHEMA_V2_SQL: &str = r#"
CREATE TABLE memory_nodes (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    topic_id TEXT NOT NULL REFERENCES topics(id),
    context_id TEXT REFERENCES memory_contexts(id),
    content TEXT NOT NULL,
    outdated TEXT,
    outdated_reason TEXT,
    CHECK ((outdated IS NULL) = (outdated_reason IS NULL))
);

INSERT INTO memory_nodes (id, created, topic_id, context_id, content, outdated, outdated_reason)
SELECT
    m.id,
    m.created,
    m.topic_id,
    m.context_id,
    m.content,
    r.created,
    CASE WHEN r.id IS NULL THEN NULL ELSE 'Replaced by memory ' || r.id || '.' END
FROM memories m
LEFT JOIN memories r ON r.id = m.replaced_by_memory_id;

CREATE TABLE memory_edges (
    source_memory_node_id TEXT NOT NULL REFERENCES memory_nodes(id),
    target_memory_node_id TEXT NOT NULL REFERENCES memory_nodes(id),
    created TEXT NOT NULL,
    PRIMARY KEY (source_memory_node_id, target_memory_node_id)
);

INSERT OR IGNORE INTO memory_edges (source_memory_node_id, target_memory_node_id, created)
SELECT to_memory_id, from_memory_id, created
FROM memory_links;

INSERT OR IGNORE INTO memory_edges (source_memory_node_id, target_memory_node_id, created)
SELECT m.id, r.id, r.created
FROM memories m
INNER JOIN memories r ON r.id = m.replaced_by_memory_id;

DROP TABLE memory_links;
DROP TABLE memories;
DROP TABLE memory_search;

CREATE VIRTUAL TABLE memory_search USING fts5(
    memory_node_id UNINDEXED,
    memory_content,
    memory_context,
    tokenize='porter unicode61 remove_diacritics 2'
);

INSERT INTO memory_search (memory_node_id, memory_content, memory_context)
SELECT mn.id, mn.content, mc.value
FROM memory_nodes mn
LEFT JOIN memory_contexts mc ON mc.id = mn.context_id;

CREATE INDEX IF NOT EXISTS idx_memory_nodes_topic_id ON memory_nodes(topic_id);
CREATE INDEX IF NOT EXISTS idx_memory_edges_target ON memory_edges(target_memory_node_id);
"#;

/// v3: importance score, backfilled to the default for existing nodes.
pub const SCHEMA_V3_SQL: &str = r#"
ALTER TABLE memory_nodes ADD COLUMN importance REAL NOT NULL DEFAULT 0.5;
"#;

/// v4: context is stored inline on the node; the context table goes away.
///
/// SQLite cannot drop a referenced column in place, so the node table is
/// rebuilt and renamed. Foreign keys must be off while this runs.
pub const SCHEMA_V4_SQL: &str = r#"
CREATE TABLE memory_nodes_v4 (
    id TEXT PRIMARY KEY NOT NULL,
    created TEXT NOT NULL,
    topic_id TEXT NOT NULL REFERENCES topics(id),
    content TEXT NOT NULL,
    context TEXT,
    importance REAL NOT NULL DEFAULT 0.5,
    outdated TEXT,
    outdated_reason TEXT,
    CHECK ((outdated IS NULL) = (outdated_reason IS NULL))
);

INSERT INTO memory_nodes_v4 (id, created, topic_id, content, context, importance, outdated, outdated_reason)
SELECT mn.id, mn.created, mn.topic_id, mn.content, mc.value, mn.importance, mn.outdated, mn.outdated_reason
FROM memory_nodes mn
LEFT JOIN memory_contexts mc ON mc.id = mn.context_id;

DROP TABLE memory_nodes;
ALTER TABLE memory_nodes_v4 RENAME TO memory_nodes;
DROP TABLE memory_contexts;

CREATE INDEX IF NOT EXISTS idx_memory_nodes_topic_id ON memory_nodes(topic_id);
CREATE INDEX IF NOT EXISTS idx_memory_nodes_created ON memory_nodes(created);
"#;

/// Column list shared by every query that materializes a memory record.
///
/// Expects `memory_nodes` aliased as `mn` and `topics` as `t`.
pub const MEMORY_COLUMNS: &str =
    "mn.id, mn.created, t.name, mn.content, mn.context, mn.importance, mn.outdated, mn.outdated_reason";
