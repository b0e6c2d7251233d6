//! # Helpsync CLI (`helpsync`)
//!
//! Command-line interface for the help-center synchronization engine.
//!
//! ## Usage
//!
//! ```bash
//! helpsync --config ./config/helpsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `helpsync run` | Sync one listing page and publish changed documents |
//! | `helpsync status` | Show tracked-article counts and sync-state summary |
//! | `helpsync stores` | List remote vector stores and assistants |
//! | `helpsync reset` | Delete all local and remote sync artifacts |
//!
//! ## Examples
//!
//! ```bash
//! # One incremental batch (cron-friendly; resumes at the saved cursor)
//! helpsync run
//!
//! # Sync without touching the remote index
//! helpsync run --skip-publish
//!
//! # Start over from scratch, keeping remote resources
//! helpsync reset --keep-remote
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use helpsync::config::{self, Config};
use helpsync::models::RunSummary;
use helpsync::openai::{IndexBackend, OpenAiClient};
use helpsync::publish::Publisher;
use helpsync::store::CorpusStore;
use helpsync::sync;
use helpsync::zendesk::ZendeskClient;

/// Helpsync CLI — incremental help-center to assistant synchronization.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/helpsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "helpsync",
    about = "Helpsync — incremental help-center article sync with assistant publishing",
    version,
    long_about = "Helpsync mirrors a Zendesk-style help center into a local markdown corpus, \
    detects changed articles by content fingerprint, and publishes only the changed documents \
    to a vector-store-backed assistant. Pagination state persists across runs, so scheduled \
    batches walk the full listing incrementally."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/helpsync.toml`. Missing file means built-in
    /// defaults; credentials always come from the environment.
    #[arg(long, global = true, default_value = "./config/helpsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Sync one listing page and publish changed documents.
    ///
    /// Fetches the next page at the persisted cursor, normalizes and
    /// fingerprints each article, writes changed artifacts to the corpus,
    /// and uploads exactly the changed-set to the vector store. Designed
    /// to be run on a schedule; each invocation advances the cursor.
    Run {
        /// Articles per listing page (overrides the config value).
        #[arg(long)]
        page_size: Option<usize>,

        /// Sync the corpus only; skip vector store and assistant updates.
        #[arg(long)]
        skip_publish: bool,
    },

    /// Show sync-state summary.
    ///
    /// Prints tracked-article count, last run time, cursor position, and
    /// the recorded remote resource ids.
    Status,

    /// List remote vector stores and assistants.
    ///
    /// Requires `OPENAI_API_KEY`. Useful for finding orphaned resources
    /// after manual experiments.
    Stores,

    /// Delete all sync artifacts and start from scratch.
    ///
    /// Removes local markdown artifacts, the persisted state (local and
    /// remote), and, unless `--keep-remote` is given, the recorded
    /// assistant, vector store, and uploaded files.
    Reset {
        /// Keep the remote assistant, vector store, and uploaded files.
        #[arg(long)]
        keep_remote: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run {
            page_size,
            skip_publish,
        } => cmd_run(&config, page_size, skip_publish),
        Commands::Status => cmd_status(&config),
        Commands::Stores => cmd_stores(),
        Commands::Reset { keep_remote } => cmd_reset(&config, keep_remote),
    }
}

fn cmd_run(config: &Config, page_size: Option<usize>, skip_publish: bool) -> Result<()> {
    let mut store = CorpusStore::open(config)?;
    let source = ZendeskClient::new(&config.source)?;
    let per_page = page_size.unwrap_or(config.source.page_size);

    let summary = sync::run_sync(&source, &mut store, per_page)?;

    println!("sync {}.zendesk.com", config.source.subdomain);
    println!("  fetched: {}", summary.total_fetched);
    println!("  added: {}", summary.added);
    println!("  updated: {}", summary.updated);
    println!("  skipped: {}", summary.skipped);
    if summary.errors > 0 {
        println!("  errors: {}", summary.errors);
    }
    if summary.pagination_complete {
        println!("  pagination: cycle complete, next run restarts");
    } else {
        println!("  pagination: resumes at saved cursor");
    }

    store.append_run_log(&run_log_line(&summary));

    if skip_publish {
        println!("publish skipped (--skip-publish)");
        return Ok(());
    }
    if summary.changed_slugs.is_empty() {
        println!("publish");
        println!("  nothing changed, no remote calls made");
        return Ok(());
    }

    let backend = OpenAiClient::from_env()?;
    let publisher = Publisher::new(&backend, &config.index);
    let report = publisher.publish(&mut store, &summary.changed_slugs)?;

    println!("publish");
    println!("  uploaded: {}", report.uploaded);
    if report.failed > 0 {
        println!("  failed: {}", report.failed);
        for error in &report.errors {
            println!("    {}", error);
        }
    }
    if let Some(counts) = report.file_counts {
        println!(
            "  remote index: {} completed, {} failed, {} in progress",
            counts.completed, counts.failed, counts.in_progress
        );
    }
    if report.timed_out {
        println!("  warning: remote indexing still in progress at poll timeout");
    }

    Ok(())
}

fn run_log_line(summary: &RunSummary) -> String {
    format!(
        "{} fetched={} added={} updated={} skipped={} errors={}\n",
        chrono::Utc::now().to_rfc3339(),
        summary.total_fetched,
        summary.added,
        summary.updated,
        summary.skipped,
        summary.errors,
    )
}

fn cmd_status(config: &Config) -> Result<()> {
    let store = CorpusStore::open(config)?;
    let state = store.state();

    println!("status");
    println!("  tracked articles: {}", state.articles.len());
    println!(
        "  last run: {}",
        state
            .last_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    println!(
        "  cursor: {}",
        if state.cursor.is_some() {
            "mid-cycle (next run resumes at saved page)"
        } else {
            "start of listing"
        }
    );
    println!(
        "  vector store: {}",
        state.vector_store_id.as_deref().unwrap_or("not created")
    );
    println!(
        "  assistant: {}",
        state.assistant_id.as_deref().unwrap_or("not created")
    );

    Ok(())
}

fn cmd_stores() -> Result<()> {
    let backend = OpenAiClient::from_env()?;

    println!("vector stores");
    for store in backend.list_vector_stores()? {
        println!("  {}  {}", store.id, store.name.unwrap_or_default());
    }
    println!("assistants");
    for assistant in backend.list_assistants()? {
        println!("  {}  {}", assistant.id, assistant.name.unwrap_or_default());
    }

    Ok(())
}

fn cmd_reset(config: &Config, keep_remote: bool) -> Result<()> {
    let mut store = CorpusStore::open(config)?;

    if !keep_remote {
        match OpenAiClient::from_env() {
            Ok(backend) => reset_remote(&backend, &store),
            Err(e) => warn!("skipping remote cleanup (no API credentials): {e:#}"),
        }
    }

    store.reset()?;
    println!("reset complete");
    Ok(())
}

/// Best-effort remote teardown: recorded assistant, recorded vector store,
/// and any uploaded files matching tracked artifact names. Failures are
/// logged and skipped so a partial remote state never blocks a reset.
fn reset_remote(backend: &dyn IndexBackend, store: &CorpusStore) {
    let state = store.state();

    if let Some(ref id) = state.assistant_id {
        match backend.delete_assistant(id) {
            Ok(()) => println!("  deleted assistant {}", id),
            Err(e) => warn!("could not delete assistant {id}: {e:#}"),
        }
    }
    if let Some(ref id) = state.vector_store_id {
        match backend.delete_vector_store(id) {
            Ok(()) => println!("  deleted vector store {}", id),
            Err(e) => warn!("could not delete vector store {id}: {e:#}"),
        }
    }

    let tracked: std::collections::BTreeSet<String> = state
        .articles
        .values()
        .map(|record| format!("{}.md", record.slug))
        .collect();
    if tracked.is_empty() {
        return;
    }
    match backend.list_files() {
        Ok(files) => {
            for file in files {
                let name = file.name.unwrap_or_default();
                if tracked.contains(&name) {
                    match backend.delete_file(&file.id) {
                        Ok(()) => println!("  deleted file {} ({})", file.id, name),
                        Err(e) => warn!("could not delete file {}: {e:#}", file.id),
                    }
                }
            }
        }
        Err(e) => warn!("could not list remote files: {e:#}"),
    }
}
