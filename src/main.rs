//! # Docfield CLI
//!
//! The `docfield` binary runs the document extraction service.
//!
//! ## Usage
//!
//! ```bash
//! docfield --config ./config/docfield.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docfield init` | Create the SQLite database and run schema migrations |
//! | `docfield serve` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docfield::{config, migrate, server};

/// Docfield — document upload and structured field extraction service.
#[derive(Parser)]
#[command(
    name = "docfield",
    about = "Docfield — document upload and structured field extraction service",
    version,
    long_about = "Docfield ingests uploaded documents, extracts their text, sends it to a \
    language model for structured field extraction, flattens the result into a flat record, \
    and persists it with change tracking across updates."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docfield.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, ingest_tasks). This command is idempotent — running it
    /// multiple times is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind`, runs migrations,
    /// and serves the upload and record endpoints until terminated.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "docfield=info".into()),
                )
                .init();
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
