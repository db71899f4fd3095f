//! # cadsmith CLI
//!
//! The `cadsmith` binary drives the pipeline end to end: indexing a
//! document tree into the vector collection, inspecting what retrieval
//! would return, and running the generation flow that appends CadQuery
//! code to a notebook.
//!
//! ## Usage
//!
//! ```bash
//! cadsmith --config ./cadsmith.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cadsmith ingest` | Index the document root into the vector collection |
//! | `cadsmith search "<query>"` | Show the ranked chunks retrieval would return |
//! | `cadsmith query "<request>"` | Run the generation flow and append to the notebook |
//!
//! ## Examples
//!
//! ```bash
//! # Index ./documents (idempotent; unchanged chunks are skipped)
//! cadsmith ingest
//!
//! # Rebuild from scratch after changing chunking parameters
//! cadsmith ingest --reset
//!
//! # See what the index knows about holes
//! cadsmith search "cut a counterbore hole"
//!
//! # Generate a part
//! cadsmith query "a 0.25 inch hexagonal nut with a chamfered top"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cadsmith::{config, ingest, query, search};

/// cadsmith — retrieval-augmented CadQuery code generation.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/cadsmith.example.toml` for a full
/// example.
#[derive(Parser)]
#[command(
    name = "cadsmith",
    about = "Retrieval-augmented CadQuery code generation from your own CAD documentation",
    version,
    long_about = "cadsmith ingests CAD documentation (PDF, Markdown, Python examples) into a \
    vector collection and answers modeling requests by retrieving reference material and \
    prompting a language model through a multi-step flow. Generated code is appended to a \
    Jupyter notebook."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./cadsmith.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index the document root into the vector collection.
    ///
    /// Walks the configured root, splits documents into chunks with
    /// stable IDs, and inserts only chunks not already present.
    /// Re-running over an unchanged tree inserts nothing.
    Ingest {
        /// Destructively clear the collection before indexing. Use
        /// after changing chunking parameters, when stable IDs would
        /// otherwise point at stale content.
        #[arg(long)]
        reset: bool,

        /// Show document and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the ranked chunks retrieval would return for a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to retrieval.top_k).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run the generation flow for a modeling request.
    ///
    /// Retrieves reference material, prompts the language model through
    /// the analyze/decompose/retrieve/evaluate/generate/verify steps,
    /// and appends the generated code to the configured notebook.
    Query {
        /// The natural-language modeling request.
        request: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            reset,
            dry_run,
            limit,
        } => {
            ingest::run_ingest(&cfg, reset, dry_run, limit).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Query { request } => {
            query::run_query(&cfg, &request).await?;
        }
    }

    Ok(())
}
