//! # Chatwoot relay CLI (`relay`)
//!
//! ## Usage
//!
//! ```bash
//! relay --config ./config/relay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay serve` | Start the webhook HTTP server |
//! | `relay ingest <root>` | Chunk, embed and append a directory tree to the store |
//! | `relay query "<text>"` | Preview the retrieval context for a question |
//! | `relay tools list` | Show the effective tool set |
//!
//! Credentials come from the environment: `HELPDESK_API_TOKEN` (or
//! `CHATWOOT_API_TOKEN`) and `OPENAI_API_KEY`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chatwoot_relay::config::{load_config, Config, LogFormat};
use chatwoot_relay::embedding::OpenAiEmbedder;
use chatwoot_relay::ingest::run_ingest;
use chatwoot_relay::jsonl_store::JsonlStore;
use chatwoot_relay::retrieval::retrieve;
use chatwoot_relay::server::run_server;
use chatwoot_relay::tools::build_registry;
use relay_core::embedding::Embedder;

/// Relay helpdesk conversations to an LLM, with retrieval and tool calling.
#[derive(Parser)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/relay.toml` when present, otherwise built-in
    /// defaults plus environment overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server on `[server].bind`.
    Serve,

    /// Ingest a directory tree into the embedding store.
    Ingest {
        /// Folder to ingest.
        root: PathBuf,

        /// Report file and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the context block and sources retrieved for a question.
    Query {
        text: String,

        /// Override `[rag].top_k`.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Inspect the tool registry.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List tools after applying the override file.
    List,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Commands::Serve => {
            config.require_serve_secrets()?;
            run_server(config).await?;
        }
        Commands::Ingest { root, dry_run } => {
            let embedder = if dry_run {
                None
            } else {
                config.require_llm_key()?;
                Some(OpenAiEmbedder::from_config(&config)?)
            };
            let store = JsonlStore::open(&config.rag.store_path);
            let summary = run_ingest(
                &config,
                &root,
                dry_run,
                embedder.as_ref().map(|e| e as &dyn Embedder),
                &store,
            )
            .await?;

            if summary.chunks == 0 {
                println!("No text found to ingest");
            } else if dry_run {
                println!("ingest {} (dry-run)", root.display());
                println!("  files read: {}", summary.files_read);
                println!("  files skipped: {}", summary.files_skipped);
                println!("  chunks: {}", summary.chunks);
            } else {
                println!(
                    "Ingested {} chunks into {}",
                    summary.embedded,
                    store.path().display()
                );
            }
        }
        Commands::Query { text, top_k } => {
            config.require_llm_key()?;
            let embedder = OpenAiEmbedder::from_config(&config)?;
            let store = JsonlStore::open(&config.rag.store_path);
            let k = top_k.unwrap_or(config.rag.top_k);
            let rag = retrieve(&embedder, &store, &text, k).await?;

            if rag.is_empty() {
                println!("No documents in {}", store.path().display());
            } else {
                println!("{}", rag.context);
                println!();
                println!("Sources:");
                for (i, source) in rag.sources.iter().enumerate() {
                    println!(
                        "  [{}] {} ({})",
                        i + 1,
                        source.title.as_deref().unwrap_or("-"),
                        source.source.as_deref().unwrap_or(&source.id)
                    );
                }
            }
        }
        Commands::Tools {
            action: ToolsAction::List,
        } => {
            let registry = build_registry(&config.tools).await?;
            if !config.tools.enabled {
                println!("(tools are disabled; set [tools] enabled = true or TOOLS_ENABLED=1)");
            }
            for tool in registry.tools() {
                println!("{} - {}", tool.name(), tool.description());
            }
        }
    }

    Ok(())
}
