//! `memory-cli` — a thin terminal front end for `memory-core`
//!
//! Stands in for the HTTP adapters the library itself stays clear of:
//! ingest/recall/stats/gdpr subcommands that exercise the public API,
//! installing the only `tracing` subscriber in this workspace (the
//! library logs, it never installs one itself).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use memory_core::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memory-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Terminal front end for the conversational memory engine")]
struct Cli {
    /// Override the default per-platform data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new memory.
    Ingest {
        /// Text to remember.
        text: String,
        #[arg(long)]
        character_id: Option<String>,
        #[arg(long)]
        conversation_id: Option<String>,
        /// Boost importance scoring for this memory.
        #[arg(long)]
        important: bool,
    },

    /// Retrieve the memories most relevant to a query.
    Recall {
        query: String,
        #[arg(long)]
        character_id: Option<String>,
        #[arg(long, default_value = "10")]
        k: usize,
    },

    /// Print engine statistics as JSON.
    Stats,

    /// Run one decay sweep, cleanup, and retention purge immediately.
    Maintain,

    /// GDPR data-subject operations.
    Gdpr {
        #[command(subcommand)]
        action: GdprAction,
    },
}

#[derive(Subcommand)]
enum GdprAction {
    /// Export every memory a user owns as portable JSON.
    Export { user_id: String },
    /// Irreversibly delete every memory a user owns.
    Delete { user_id: String },
    /// Replace a user id with an unlinkable pseudonym everywhere.
    Anonymize { user_id: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("MEMORY_LOG"))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let engine = match &cli.data_dir {
        Some(path) => Engine::open(path, config).await,
        None => Engine::open_default(config).await,
    };
    let engine = match engine {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, "failed to open engine");
            std::process::exit(1);
        }
    };

    let shutdown = tokio::spawn({
        let lifecycle = engine.lifecycle.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt, shutting down");
            lifecycle.shutdown();
        }
    });

    if let Err(e) = run(&engine, cli.command).await {
        error!(error = %e, "command failed");
        shutdown.abort();
        std::process::exit(1);
    }
    shutdown.abort();
}

async fn run(engine: &Engine, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest {
            text,
            character_id,
            conversation_id,
            important,
        } => {
            let memory = engine
                .ingest(
                    "cli-user",
                    IngestInput {
                        text,
                        character_id,
                        conversation_id,
                        memory_type: None,
                        flagged_important: important,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&memory).unwrap());
        }
        Commands::Recall { query, character_id, k } => {
            let results = engine
                .recall("cli-user", &RecallInput { query, character_id, k })
                .await?;
            println!("{}", serde_json::to_string_pretty(&results).unwrap());
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats()).unwrap());
        }
        Commands::Maintain => {
            let report = engine.run_maintenance()?;
            println!("{}", serde_json::to_string_pretty(&report).unwrap());
        }
        Commands::Gdpr { action } => match action {
            GdprAction::Export { user_id } => {
                println!("{}", serde_json::to_string_pretty(&engine.gdpr_export(&user_id)?).unwrap());
            }
            GdprAction::Delete { user_id } => {
                let deleted = engine.gdpr_delete(&user_id)?;
                println!("deleted {deleted} memories for {user_id}");
            }
            GdprAction::Anonymize { user_id } => {
                let pseudonym = engine.gdpr_anonymize(&user_id)?;
                println!("{user_id} -> {pseudonym}");
            }
        },
    }
    Ok(())
}
