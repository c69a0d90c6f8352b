//! Operation surface for agents
//!
//! One entry point per store operation. Expected conditions (bad input,
//! unknown ids, duplicate links) come back as [`ToolOutput::CallerError`] with
//! a message meant for the caller; only fatal storage failures are `Err`.

use crate::error::{Error, Result};
use crate::memory_store::MemoryStore;
use crate::model::{NewMemories, OutdatedStatus, SearchRequest};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Names accepted by [`Tools::dispatch`]
pub const TOOL_NAMES: &[&str] = &[
    "create_memories",
    "create_memory",
    "connect_memories",
    "get_memory_by_id",
    "mark_memory_as_outdated",
    "search_memory",
    "get_topics",
    "usage_prompt",
];

/// Guidance for an agent on how to use the memory tools
pub const USAGE_PROMPT: &str = r#"You have tools for storing and searching memories. Use them to keep important
information you learn from the user and to recall what may matter for the task at hand.

1. Search first
   - Search memory at the start of a conversation, and again when the subject changes or new details appear.
   - Search whenever the user talks as if you should already know something ("do you remember",
     "I told you", "back to ...") or brings up a subject missing from the current context.
   - Memories marked outdated should not be relied on. Follow their links to find the newer memory.

2. Save what will matter later
   - Always save when the user says "remember that".
   - Also save things likely to be useful later: preferences, interests, past experiences, ongoing projects,
     and significant personal details.
   - Group memories under broad topics such as "Programming" or "Travel". A narrower topic such as
     "2025 Vacation Plans" is fine; one as narrow as "2025 Vacation Plans - Hawaii Hotel Reviews" is not.
   - Keep memories short and self-contained. Phrase them in whatever way will help you most later.
   - Use the optional context to note why a memory was saved, and importance (0 to 1) to rank it.

3. Connect related memories
   - Memories are nodes in a graph. Link related memories so one leads to the others.
   - When loading a memory, use its links to find related information.

4. Keep memory current
   - When a memory is no longer accurate, mark it as outdated with a reason.
   - Save the corrected information as a new memory linked from the outdated one.

5. Work quietly
   - Do not announce that you are saving or updating memories.
   - Searches can be silent or accompanied by a short phrase such as "Let me think about that."
   - Do not summarize your memories unless asked to."#;

/// What an operation hands back to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Structured payload
    Success(Value),
    /// Plain confirmation text
    Message(String),
    /// Expected failure, described for the caller
    CallerError(String),
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::CallerError(_))
    }

    /// Render as the text a caller sees
    pub fn to_text(&self) -> Result<String> {
        match self {
            Self::Success(value) => Ok(serde_json::to_string(value)?),
            Self::Message(text) | Self::CallerError(text) => Ok(text.clone()),
        }
    }

    fn success(value: impl serde::Serialize) -> Result<Self> {
        Ok(Self::Success(serde_json::to_value(value)?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMemoriesArgs {
    pub topic: String,
    pub contents: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub link_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMemoryArgs {
    pub topic: String,
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub link_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectMemoriesArgs {
    /// The older memory
    pub source_memory_id: Uuid,
    /// The newer memories
    pub target_memory_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetMemoryArgs {
    pub memory_id: Uuid,
    #[serde(default)]
    pub include_linked_memories: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkOutdatedArgs {
    pub memory_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchMemoryArgs {
    pub phrases: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub exclude_outdated: bool,
}

/// Tool handlers over one store
#[derive(Debug, Clone)]
pub struct Tools {
    store: MemoryStore,
}

impl Tools {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Route a named call with JSON arguments to its handler
    ///
    /// Unknown tools and malformed arguments are caller errors. A `null`
    /// argument value is treated as an empty object.
    #[instrument(skip(self, arguments))]
    pub async fn dispatch(&self, tool: &str, arguments: Value) -> Result<ToolOutput> {
        let arguments = if arguments.is_null() { Value::Object(Default::default()) } else { arguments };

        match tool {
            "create_memories" => match parse(tool, arguments) {
                Ok(args) => self.create_memories(args).await,
                Err(output) => Ok(output),
            },
            "create_memory" => match parse(tool, arguments) {
                Ok(args) => self.create_memory(args).await,
                Err(output) => Ok(output),
            },
            "connect_memories" => match parse(tool, arguments) {
                Ok(args) => self.connect_memories(args).await,
                Err(output) => Ok(output),
            },
            "get_memory_by_id" => match parse(tool, arguments) {
                Ok(args) => self.get_memory_by_id(args).await,
                Err(output) => Ok(output),
            },
            "mark_memory_as_outdated" => match parse(tool, arguments) {
                Ok(args) => self.mark_memory_as_outdated(args).await,
                Err(output) => Ok(output),
            },
            "search_memory" => match parse(tool, arguments) {
                Ok(args) => self.search_memory(args).await,
                Err(output) => Ok(output),
            },
            "get_topics" => self.get_topics().await,
            "usage_prompt" => Ok(Self::usage_prompt()),
            other => {
                debug!(tool = other, "unknown tool");
                Ok(ToolOutput::CallerError(format!(
                    "Unknown tool: {other}. Available tools: {}",
                    TOOL_NAMES.join(", ")
                )))
            }
        }
    }

    pub async fn create_memories(&self, args: CreateMemoriesArgs) -> Result<ToolOutput> {
        let batch = NewMemories {
            topic: args.topic,
            contents: args.contents,
            context: args.context,
            importance: args.importance,
            link_to: args.link_to,
        };

        match self.store.create_memories(batch).await {
            Ok(created) => ToolOutput::success(created),
            Err(err) => caller_error(err),
        }
    }

    pub async fn create_memory(&self, args: CreateMemoryArgs) -> Result<ToolOutput> {
        let created = self
            .store
            .create_memory(&args.topic, &args.content, args.context, args.importance, args.link_to)
            .await;

        match created {
            Ok(created) => ToolOutput::success(created),
            Err(err) => caller_error(err),
        }
    }

    pub async fn connect_memories(&self, args: ConnectMemoriesArgs) -> Result<ToolOutput> {
        match self.store.connect_memories(args.source_memory_id, args.target_memory_ids).await {
            Ok(_) => Ok(ToolOutput::Message("Memories linked successfully.".to_string())),
            Err(err) => caller_error(err),
        }
    }

    pub async fn get_memory_by_id(&self, args: GetMemoryArgs) -> Result<ToolOutput> {
        match self.store.get_memory(args.memory_id, args.include_linked_memories).await? {
            Some(memory) => ToolOutput::success(memory),
            None => Ok(ToolOutput::CallerError("Memory not found.".to_string())),
        }
    }

    pub async fn mark_memory_as_outdated(&self, args: MarkOutdatedArgs) -> Result<ToolOutput> {
        match self.store.mark_outdated(args.memory_id, &args.reason).await {
            Ok(OutdatedStatus::Marked) => Ok(ToolOutput::Message("Memory marked as outdated.".to_string())),
            Ok(OutdatedStatus::AlreadyOutdated) => {
                Ok(ToolOutput::Message("Memory is already marked as outdated.".to_string()))
            }
            Err(Error::NotFound { .. }) => Ok(ToolOutput::CallerError("Invalid memory node ID.".to_string())),
            Err(err) => caller_error(err),
        }
    }

    pub async fn search_memory(&self, args: SearchMemoryArgs) -> Result<ToolOutput> {
        let request = SearchRequest {
            phrases: args.phrases,
            topics: args.topics,
            max_results: args.max_results,
            exclude_outdated: args.exclude_outdated,
        };

        match self.store.search(request).await {
            Ok(hits) => ToolOutput::success(hits),
            Err(err) => caller_error(err),
        }
    }

    pub async fn get_topics(&self) -> Result<ToolOutput> {
        ToolOutput::success(self.store.topics().await?)
    }

    pub fn usage_prompt() -> ToolOutput {
        ToolOutput::Message(USAGE_PROMPT.to_string())
    }
}

/// Turn a caller error into output; fatal errors keep propagating
fn caller_error(err: Error) -> Result<ToolOutput> {
    if err.is_caller_error() {
        debug!(error = %err, "caller error");
        Ok(ToolOutput::CallerError(err.to_string()))
    } else {
        Err(err)
    }
}

fn parse<T: DeserializeOwned>(tool: &str, arguments: Value) -> std::result::Result<T, ToolOutput> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolOutput::CallerError(format!("Invalid arguments for {tool}: {e}")))
}
