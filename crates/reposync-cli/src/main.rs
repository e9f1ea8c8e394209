//! RepoSync CLI
//!
//! Keeps a commit-keyed chunk index of a git repository in a local store and
//! queries it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reposync_core::{SyncConfig, CONFIG_FILE_NAME};
use reposync_indexer::storage::chunk_from_record;
use reposync_indexer::{
    create_embedder, Chunker, GitCli, LocalStore, SyncEngine, SyncOptions, SyncOutcome,
    SyncState, TiktokenCounter, TokenCounter, VectorStore, Where,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reposync")]
#[command(about = "RepoSync - commit-keyed code chunk index for retrieval")]
#[command(version)]
struct Cli {
    /// Config file (default: <repo>/.reposync.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Maximum tokens per chunk, overriding the config file
    #[arg(long, global = true)]
    token_budget: Option<usize>,

    /// Store directory, overriding the config file
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the repository up to HEAD
    Sync {
        /// Repository path (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show the latest indexed commit and whether HEAD has moved
    Status {
        /// Repository path (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List indexed commits, newest first
    History {
        /// Repository path (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Search the latest indexed commit
    Query {
        /// Search text
        text: String,

        /// Repository path
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Number of results
        #[arg(short = 'n', long, default_value_t = 5)]
        n_results: usize,

        /// Only search chunks of this file (repository-relative)
        #[arg(long)]
        file: Option<String>,
    },

    /// Print the chunks of one file without touching the store
    Chunks {
        /// Source file
        file: PathBuf,
    },
}

impl Commands {
    fn repo_path(&self) -> Result<PathBuf> {
        let path = match self {
            Commands::Sync { path }
            | Commands::Status { path }
            | Commands::History { path }
            | Commands::Query { path, .. } => path.clone(),
            Commands::Chunks { .. } => {
                std::env::current_dir().context("Cannot read current directory")?
            }
        };
        path.canonicalize()
            .with_context(|| format!("Invalid path: {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.command.repo_path()?;
    let config = load_config(&cli, &root)?;

    init_logging(&config.log_level);

    match cli.command {
        Commands::Sync { .. } => cmd_sync(&config, &root).await,
        Commands::Status { .. } => cmd_status(&config, &root).await,
        Commands::History { .. } => cmd_history(&config, &root).await,
        Commands::Query {
            text,
            n_results,
            file,
            ..
        } => cmd_query(&config, &root, &text, n_results, file.as_deref()).await,
        Commands::Chunks { file } => cmd_chunks(&config, &file),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file (explicit or discovered), then command-line overrides.
fn load_config(cli: &Cli, root: &Path) -> Result<SyncConfig> {
    let from_file = match &cli.config {
        Some(path) => Some(
            SyncConfig::load_from(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
        ),
        None => SyncConfig::discover(root)
            .with_context(|| format!("Failed to load {}", CONFIG_FILE_NAME))?,
    };

    let mut config = match (from_file, cli.token_budget) {
        (Some(mut config), Some(budget)) => {
            config.token_budget = budget;
            config
        }
        (Some(config), None) => config,
        (None, Some(budget)) => SyncConfig::new(budget),
        (None, None) => bail!(
            "No token budget configured. Pass --token-budget or set token_budget in {}",
            CONFIG_FILE_NAME
        ),
    };

    if let Some(dir) = &cli.store_dir {
        config.store_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn open_store(config: &SyncConfig, root: &Path) -> Result<Arc<dyn VectorStore>> {
    let embedder = create_embedder(&config.embedding_model)
        .await
        .with_context(|| format!("Failed to load embedding model {}", config.embedding_model))?;
    let store = LocalStore::open_for_repo(&config.store_dir, root, embedder)
        .await
        .context("Failed to open store")?;
    Ok(Arc::new(store))
}

fn build_chunker(config: &SyncConfig) -> Result<(Chunker, Arc<dyn TokenCounter>)> {
    let counter: Arc<dyn TokenCounter> = Arc::new(TiktokenCounter::for_model(&config.encoding_model)?);
    Ok((Chunker::new(Arc::clone(&counter), config.token_budget), counter))
}

async fn build_engine(config: &SyncConfig, root: &Path) -> Result<SyncEngine> {
    let store = open_store(config, root).await?;
    let (chunker, _) = build_chunker(config)?;
    let engine = SyncEngine::new(
        root,
        Arc::new(GitCli::new(root)),
        store,
        chunker,
        SyncOptions::from(config),
    )?;
    Ok(engine)
}

async fn cmd_sync(config: &SyncConfig, root: &Path) -> Result<()> {
    let engine = build_engine(config, root).await?;
    let report = engine.sync().await.context("Sync failed")?;
    let commit = short_id(&report.commit);

    match report.outcome {
        SyncOutcome::FullIndex { files, chunks } => {
            println!("✓ Indexed {} files ({} chunks) at {}", files, chunks, commit);
        }
        SyncOutcome::DeltaIndex {
            added,
            modified,
            deleted,
            chunks_removed,
            chunks_added,
        } => {
            println!("✓ Synced to {}", commit);
            println!(
                "  Files:   {} added, {} modified, {} deleted",
                added, modified, deleted
            );
            println!(
                "  Chunks:  {} removed, {} added",
                chunks_removed, chunks_added
            );
        }
        SyncOutcome::UpToDate => {
            println!("✓ Already up to date at {}", commit);
        }
        SyncOutcome::Restored => {
            println!("✓ Switched to previously indexed {}", commit);
        }
    }

    Ok(())
}

async fn cmd_status(config: &SyncConfig, root: &Path) -> Result<()> {
    let engine = build_engine(config, root).await?;
    println!("Repository: {}", root.display());

    let latest = match engine.state().await? {
        SyncState::Synced(pointer) => pointer,
        SyncState::Uninitialized => {
            println!("  Status: Not indexed");
            println!();
            println!("Index with: reposync sync");
            return Ok(());
        }
    };

    let chunks = engine.store().get_collection(&latest.commit_id).await?.count;

    println!("  Indexed: {}", short_id(&latest.commit_id));
    if let Some(at) = latest.indexed_at {
        println!("  At:      {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  Chunks:  {}", chunks);

    match engine.resolve_head().await {
        Ok(head) if head.id == latest.commit_id => println!("  Status:  Up to date"),
        Ok(head) => {
            println!("  HEAD:    {}", short_id(&head.id));
            println!("  Status:  Behind HEAD (run: reposync sync)");
        }
        Err(e) => println!("  HEAD:    unavailable ({})", e),
    }

    Ok(())
}

async fn cmd_history(config: &SyncConfig, root: &Path) -> Result<()> {
    let engine = build_engine(config, root).await?;
    let history = engine.commit_log().history().await?;

    if history.is_empty() {
        println!("No commits indexed yet.");
        return Ok(());
    }

    for pointer in history {
        let marker = if pointer.is_latest { "*" } else { " " };
        let at = pointer
            .indexed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let subject = pointer.message.lines().next().unwrap_or_default();
        println!(
            "{} {}  {:16}  {}",
            marker,
            short_id(&pointer.commit_id),
            at,
            subject
        );
    }

    Ok(())
}

async fn cmd_query(
    config: &SyncConfig,
    root: &Path,
    text: &str,
    n_results: usize,
    file: Option<&str>,
) -> Result<()> {
    let engine = build_engine(config, root).await?;
    let SyncState::Synced(latest) = engine.state().await? else {
        println!("Repository is not indexed. Run: reposync sync");
        return Ok(());
    };

    let filter = file.map(|f| Where::eq("filePath", f));
    let hits = engine
        .store()
        .query(&latest.commit_id, text, n_results, filter.as_ref())
        .await?;

    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for hit in hits {
        let chunk = chunk_from_record(&hit.record);
        println!(
            "{:.3}  {}:{}-{}  {}",
            hit.score,
            chunk.file_path.as_deref().unwrap_or("?"),
            chunk.start_line + 1,
            chunk.end_line + 1,
            chunk.symbol.as_deref().unwrap_or("")
        );
        for line in chunk.document.lines().take(3) {
            println!("    {}", line);
        }
    }

    Ok(())
}

fn cmd_chunks(config: &SyncConfig, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let (chunker, counter) = build_chunker(config)?;

    let name = file.to_string_lossy().replace('\\', "/");
    let chunks = chunker.chunk_source(&name, &content)?;
    if chunks.is_empty() {
        println!("No chunks (unsupported file type or empty file).");
        return Ok(());
    }

    for chunk in &chunks {
        println!(
            "[{}-{}] {} ({} tokens)",
            chunk.start_line + 1,
            chunk.end_line + 1,
            chunk.symbol.as_deref().unwrap_or("-"),
            counter.count(&chunk.document)
        );
    }
    println!();
    println!(
        "{} chunks, budget {} tokens",
        chunks.len(),
        chunker.token_budget()
    );

    Ok(())
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}
