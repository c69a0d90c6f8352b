//! Async handle over the knowledge store
//!
//! Every operation opens its own connection and runs its reads and writes in
//! a single closure on that connection's worker thread, so a transaction is
//! never held across an `.await`.

use crate::connection::Database;
use crate::edges::{self, LinkOutcome};
use crate::error::{Error, Result};
use crate::memories::{self, CreateOutcome};
use crate::model::{CreatedMemory, Memory, MemoryWithLinks, NewMemories, OutdatedStatus, SearchRequest, StoreOptions};
use crate::search;
use crate::topics;

use chrono::Utc;
use kbase_core::logging::truncate_for_log;
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;

/// A handle to the knowledge store backed by SQLite FTS5
///
/// The store provides:
/// - Batched memory creation with optional linking
/// - Directed links between memories
/// - A one-way outdated marker
/// - Full-text search ranked by relevance and importance
#[derive(Debug, Clone)]
pub struct MemoryStore {
    db: Database,
    options: StoreOptions,
}

impl MemoryStore {
    /// Open or create a store at the given path with default options
    pub async fn open(db_path: &Path) -> Result<Self> {
        Self::open_with(db_path, StoreOptions::default()).await
    }

    /// Open or create a store, applying pending schema migrations
    #[instrument(skip_all, fields(db_path = %db_path.display()))]
    pub async fn open_with(db_path: &Path, options: StoreOptions) -> Result<Self> {
        tracing::info!("Opening knowledge store at {}", db_path.display());

        let db = Database::new(db_path, options.busy_timeout);
        db.initialize(options.wal).await?;

        tracing::info!("Knowledge store opened successfully");
        Ok(Self { db, options })
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    /// Create a batch of memories under one topic
    ///
    /// With `link_to`, every new memory gets an edge from that memory. A
    /// missing `link_to` fails the whole batch with [`Error::InvalidReference`].
    #[instrument(skip(self, batch), fields(topic = %batch.topic, count = batch.contents.len()))]
    pub async fn create_memories(&self, batch: NewMemories) -> Result<Vec<CreatedMemory>> {
        memories::validate_new(&batch).map_err(Error::Validation)?;
        tracing::debug!("Creating {} memories", batch.contents.len());

        let conn = self.db.connect().await?;
        let outcome = conn
            .call(move |conn| memories::create(conn, batch, Utc::now()))
            .await?;

        match outcome {
            CreateOutcome::Created(created) => {
                tracing::debug!("Created {} memories", created.len());
                Ok(created)
            }
            CreateOutcome::InvalidLinkTarget(id) => Err(Error::InvalidReference { id }),
        }
    }

    /// Create a single memory
    #[instrument(skip(self, content, context))]
    pub async fn create_memory(
        &self, topic: &str, content: &str, context: Option<String>, importance: Option<f64>, link_to: Option<Uuid>,
    ) -> Result<CreatedMemory> {
        tracing::trace!(content = %truncate_for_log(content, 80), "create memory");

        let batch = NewMemories {
            topic: topic.to_owned(),
            contents: vec![content.to_owned()],
            context,
            importance,
            link_to,
        };

        self.create_memories(batch)
            .await?
            .pop()
            .ok_or_else(|| Error::database("Create returned no memory"))
    }

    /// Add an edge from `source` to every target, all or nothing
    ///
    /// Returns the number of edges written.
    #[instrument(skip(self, targets), fields(%source, count = targets.len()))]
    pub async fn connect_memories(&self, source: Uuid, targets: Vec<Uuid>) -> Result<usize> {
        let conn = self.db.connect().await?;
        let outcome = conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let outcome = edges::insert(&tx, source, &targets, Utc::now())?;
                if matches!(outcome, LinkOutcome::Linked(_)) {
                    tx.commit()?;
                }
                Ok::<_, rusqlite::Error>(outcome)
            })
            .await?;

        match outcome {
            LinkOutcome::Linked(count) => {
                tracing::debug!("Linked {} memories", count);
                Ok(count)
            }
            LinkOutcome::InvalidIds => Err(Error::InvalidIds),
            LinkOutcome::AlreadyLinked => Err(Error::AlreadyLinked),
        }
    }

    /// Retrieve a memory by id, optionally with the memories it links to
    #[instrument(skip(self), fields(%id, include_linked))]
    pub async fn get_memory(&self, id: Uuid, include_linked: bool) -> Result<Option<MemoryWithLinks>> {
        tracing::trace!("Getting memory");

        let conn = self.db.connect().await?;
        let memory = conn
            .call(move |conn| memories::fetch(conn, id, include_linked))
            .await?;

        Ok(memory)
    }

    /// Mark a memory as outdated; the first reason recorded is kept
    #[instrument(skip(self, reason), fields(%id))]
    pub async fn mark_outdated(&self, id: Uuid, reason: &str) -> Result<OutdatedStatus> {
        if reason.trim().is_empty() {
            return Err(Error::validation("reason must not be empty."));
        }

        let reason = reason.to_owned();
        let conn = self.db.connect().await?;
        let status = conn
            .call(move |conn| memories::mark_outdated(conn, id, &reason, Utc::now()))
            .await?;

        let status = status.ok_or_else(|| Error::not_found(id))?;
        tracing::debug!(?status, "mark outdated");
        Ok(status)
    }

    /// Search memory content
    ///
    /// Hits are ordered by the weighted blend of text relevance and importance.
    #[instrument(skip(self, request), fields(phrases = request.phrases.len(), topics = request.topics.len()))]
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<Memory>> {
        let max_results =
            search::validate(&request, self.options.default_max_results).map_err(Error::Validation)?;
        tracing::debug!("Searching with {} phrases, limit {}", request.phrases.len(), max_results);

        let weights = self.options.weights;
        let conn = self.db.connect().await?;
        let hits = conn
            .call(move |conn| search::search(conn, &request, weights, max_results))
            .await?;

        Ok(hits)
    }

    /// All topic names in name order
    #[instrument(skip(self))]
    pub async fn topics(&self) -> Result<Vec<String>> {
        let conn = self.db.connect().await?;
        let names = conn.call(|conn| topics::list(conn)).await?;
        Ok(names)
    }
}
