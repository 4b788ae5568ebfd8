//! # reqtrace CLI
//!
//! The `reqtrace` binary runs requirement-to-test traceability analysis
//! either as a one-shot command or behind the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! reqtrace --config ./config/reqtrace.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reqtrace init` | Create the SQLite store and its schema |
//! | `reqtrace serve` | Start the HTTP API server |
//! | `reqtrace analyze --base <doc> --tests <csv>` | Analyze a document against a test table |
//! | `reqtrace status <job-id>` | Print a job's status |
//! | `reqtrace search "<query>"` | Search indexed test-case rows |
//!
//! ## Examples
//!
//! ```bash
//! reqtrace init
//! reqtrace analyze --base requirements.pdf --tests tests.csv --json
//! reqtrace search "login validation" --job 3f0c...
//! reqtrace serve
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use reqtrace::{cli, config, migrate, server};

/// Requirement-to-test traceability analysis.
#[derive(Parser)]
#[command(name = "reqtrace", version, about)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when it is missing.
    #[arg(long, global = true, default_value = "./config/reqtrace.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the SQLite store.
    ///
    /// Creates the database file and the key-value table. Safe to run
    /// repeatedly.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` and serves submit, process, status, result
    /// and search endpoints.
    Serve,

    /// Analyze a requirements document against a test table.
    ///
    /// Runs the full pipeline in-process and prints coverage metrics and
    /// recommendations. Requires a configured LLM provider.
    Analyze {
        /// Requirements document (PDF, DOCX or plain text).
        #[arg(long)]
        base: PathBuf,

        /// Test-case table (CSV, header row first).
        #[arg(long)]
        tests: PathBuf,

        /// Updated revision of the requirements document.
        #[arg(long)]
        updated: Option<PathBuf>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the status of a job.
    Status {
        /// Job id returned by `analyze` or `POST /submit`.
        job_id: String,
    },

    /// Search indexed test-case rows.
    ///
    /// Query terms are widened with LLM-suggested synonyms and matched
    /// against each row's text and fields.
    Search {
        /// The search query string.
        query: String,

        /// Restrict results to a job. Repeat to search several jobs.
        #[arg(long = "job")]
        jobs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let cfg = config::load_config_or_default(&args.config)?;

    match args.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Analyze {
            base,
            tests,
            updated,
            json,
        } => {
            cli::run_analyze(&cfg, &base, &tests, updated.as_deref(), json).await?;
        }
        Commands::Status { job_id } => {
            cli::run_status(&cfg, &job_id).await?;
        }
        Commands::Search { query, jobs } => {
            cli::run_search(&cfg, &query, &jobs).await?;
        }
    }

    Ok(())
}
