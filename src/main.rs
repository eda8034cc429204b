//! # Grounded CLI (`grounded`)
//!
//! ## Usage
//!
//! ```bash
//! grounded --config ./config/grounded.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `grounded init` | Create the SQLite database and run schema migrations |
//! | `grounded ingest` | Rebuild the index from `[ingest].data_dir` |
//! | `grounded ask "<question>"` | Answer a question with citations |
//! | `grounded retrieve "<question>"` | Show the context an answer would use |
//! | `grounded chat` | Interactive question loop |
//! | `grounded stats` | Index statistics |
//!
//! Logs go to stderr; set `RUST_LOG=grounded_core=debug` to trace each query stage.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use grounded::{ask, config, ingest, migrate, stats};

/// Grounded: answers questions from your own documents, with citations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/grounded.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "grounded",
    about = "Grounded: retrieval-augmented answering over local Markdown and JSON",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/grounded.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// This command is idempotent; running it multiple times is safe.
    Init,

    /// Rebuild the index from the configured data directory.
    ///
    /// Scans Markdown and JSON files, splits them into chunks, embeds
    /// every chunk and replaces the stored index.
    Ingest {
        /// Show file, passage and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question from the indexed documents.
    Ask {
        question: String,

        /// Print `{answer, citations, outcome}` as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the assembled context for a question without calling the LLM.
    Retrieve { question: String },

    /// Interactive question loop. `exit`, `quit` or Ctrl-D ends it.
    Chat,

    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Ask { question, json } => {
            ask::run_ask(&cfg, &question, json).await?;
        }
        Commands::Retrieve { question } => {
            ask::run_retrieve(&cfg, &question).await?;
        }
        Commands::Chat => {
            ask::run_chat(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
