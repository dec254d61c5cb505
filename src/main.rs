//! # Cube Catalog CLI (`cubes`)
//!
//! ## Usage
//!
//! ```bash
//! cubes --config ./config/cubes.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cubes init` | Create the store document and asset root |
//! | `cubes list` | Print every record |
//! | `cubes get <id>` | Print one record as JSON |
//! | `cubes next-id` | Print the id the next record would receive |
//! | `cubes serve` | Start the HTTP server |
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cube_catalog::config;
use cube_catalog::error::CatalogError;
use cube_catalog::server;
use cube_catalog::store::RecordStore;

/// Cube Catalog: a JSON-backed collection catalog with per-record assets.
#[derive(Parser)]
#[command(
    name = "cubes",
    about = "Cube Catalog: a JSON-backed collection catalog with per-record assets",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cubes.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store document and asset root.
    ///
    /// Idempotent: an existing document is left untouched.
    Init,

    /// Print id, name, and solved state of every record.
    List,

    /// Print one record as pretty JSON.
    Get {
        /// Record id.
        id: String,
    },

    /// Print the id the next record created without an id would receive.
    NextId,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let store = RecordStore::from_config(&cfg);

    match cli.command {
        Commands::Init => {
            store.ensure_document().await?;
            let assets_root = store.assets().cubes_root();
            tokio::fs::create_dir_all(&assets_root)
                .await
                .with_context(|| format!("Failed to create {}", assets_root.display()))?;
            println!("Catalog initialized at {}", store.path().display());
        }
        Commands::List => {
            let records = store.list_all().await?;
            if records.is_empty() {
                println!("No records.");
            }
            for r in &records {
                let mark = if r.solved { "solved" } else { "-" };
                println!("{:>6}  {:<8}  {}", r.id, mark, r.name);
            }
        }
        Commands::Get { id } => match store.get_by_id(&id).await {
            Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            Err(CatalogError::NotFound(what)) => {
                eprintln!("Error: {} not found", what);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Commands::NextId => {
            println!("{}", store.next_id().await?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
