mod serve;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use kbase_core::config::default_data_dir;
use kbase_core::logging::{self, LoggingConfig};
use kbase_core::Config;
use kbase_store::tools::{
    ConnectMemoriesArgs, CreateMemoriesArgs, GetMemoryArgs, MarkOutdatedArgs, SearchMemoryArgs,
};
use kbase_store::{MemoryStore, StoreOptions, ToolOutput, Tools};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Exit code for expected failures such as validation or unknown ids
const CALLER_ERROR_EXIT: i32 = 2;

/// kbase - a persistent knowledge-memory store for agents
#[derive(Parser, Debug)]
#[command(name = "kbase")]
#[command(about = "Store, link and search short memories grouped by topic", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to kbase.toml (default: <data dir>/kbase/kbase.toml)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a database (or bring an existing one to the latest schema)
    InitDb {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Create memories under a topic
    Create {
        #[arg(short, long)]
        topic: String,

        /// Why these memories were saved
        #[arg(long)]
        context: Option<String>,

        /// Between 0 and 1 (default: 0.5)
        #[arg(short, long)]
        importance: Option<f64>,

        /// Existing memory to link the new ones from
        #[arg(long, value_name = "ID")]
        link_to: Option<Uuid>,

        #[arg(required = true, value_name = "CONTENT")]
        contents: Vec<String>,
    },
    /// Link a memory to one or more newer memories
    Link {
        #[arg(value_name = "SOURCE")]
        source: Uuid,

        #[arg(required = true, value_name = "TARGET")]
        targets: Vec<Uuid>,
    },
    /// Show a memory
    Get {
        id: Uuid,

        /// Include the memories it links to
        #[arg(short, long)]
        linked: bool,
    },
    /// Mark a memory as outdated
    Outdate {
        id: Uuid,

        #[arg(short, long)]
        reason: String,
    },
    /// Search memory content
    Search {
        #[arg(required = true, value_name = "PHRASE")]
        phrases: Vec<String>,

        /// Restrict to a topic (repeatable)
        #[arg(short, long = "topic", value_name = "TOPIC")]
        topics: Vec<String>,

        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        #[arg(long)]
        exclude_outdated: bool,
    },
    /// List topics
    Topics,
    /// Print guidance for agents using the store
    Prompt,
    /// Answer JSON-lines requests on stdin until it closes
    Serve,
    /// Print an example kbase.toml
    ExampleConfig,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(CALLER_ERROR_EXIT),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Returns `false` when the operation ended in a caller error
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::ExampleConfig => {
            print!("{}", Config::example());
            return Ok(true);
        }
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "kbase", &mut std::io::stdout());
            return Ok(true);
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref(), cli.db.as_deref())?;
    let _guard = logging::init_logging(Some(logging_config(&config, cli.verbose))).context("Failed to set up logging")?;

    if let Commands::InitDb { path } = &cli.command {
        return cmd_init_db(path, &config).await;
    }

    let db_path = config.database_path().context("Failed to resolve database path")?;
    if cli.verbose {
        eprintln!("{} Using database: {}", "Info:".blue().bold(), db_path.display());
    }

    let store = MemoryStore::open_with(&db_path, StoreOptions::from(&config))
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let tools = Tools::new(store);

    let output = match cli.command {
        Commands::Create { topic, context, importance, link_to, contents } => {
            tools
                .create_memories(CreateMemoriesArgs { topic, contents, context, importance, link_to })
                .await?
        }
        Commands::Link { source, targets } => {
            tools
                .connect_memories(ConnectMemoriesArgs { source_memory_id: source, target_memory_ids: targets })
                .await?
        }
        Commands::Get { id, linked } => {
            tools.get_memory_by_id(GetMemoryArgs { memory_id: id, include_linked_memories: linked }).await?
        }
        Commands::Outdate { id, reason } => {
            tools.mark_memory_as_outdated(MarkOutdatedArgs { memory_id: id, reason }).await?
        }
        Commands::Search { phrases, topics, max_results, exclude_outdated } => {
            tools
                .search_memory(SearchMemoryArgs { phrases, topics, max_results, exclude_outdated })
                .await?
        }
        Commands::Topics => tools.get_topics().await?,
        Commands::Prompt => Tools::usage_prompt(),
        Commands::Serve => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            serve::serve(&tools, stdin, tokio::io::stdout()).await?;
            return Ok(true);
        }
        Commands::InitDb { .. } | Commands::ExampleConfig | Commands::Completions { .. } => return Ok(true),
    };

    print_output(&output)?;
    Ok(!output.is_error())
}

/// Load config, falling back to defaults when the file is missing
fn load_config(path: Option<&Path>, db: Option<&Path>) -> Result<Config> {
    let default_path = default_data_dir().map(|dir| dir.join("kbase.toml"));
    let path = path.map(Path::to_path_buf).or(default_path);

    let mut config = Config::load(path.as_deref())
        .with_context(|| format!("Failed to load config from {}", display_path(path.as_deref())))?;

    if let Some(db) = db {
        config.database.path = Some(db.to_path_buf());
    }
    Ok(config)
}

fn logging_config(config: &Config, verbose: bool) -> LoggingConfig {
    let logging = LoggingConfig::from(config.logging.clone());
    if verbose { logging.with_level("debug") } else { logging }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_else(|| "<none>".to_string())
}

/// Create the database file and apply every pending migration
async fn cmd_init_db(path: &Path, config: &Config) -> Result<bool> {
    let store = MemoryStore::open_with(path, StoreOptions::from(config))
        .await
        .with_context(|| format!("Failed to initialize database at {}", path.display()))?;

    println!(
        "{} Database ready at {} (schema version {})",
        "Success:".green().bold(),
        store.path().display(),
        kbase_store::SCHEMA_VERSION
    );
    Ok(true)
}

fn print_output(output: &ToolOutput) -> Result<()> {
    match output {
        ToolOutput::Success(value) => {
            println!("{}", serde_json::to_string_pretty(value).context("Failed to encode output")?)
        }
        ToolOutput::Message(text) | ToolOutput::CallerError(text) => println!("{text}"),
    }
    Ok(())
}
