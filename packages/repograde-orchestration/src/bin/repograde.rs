//! Repograde cache CLI
//!
//! Inspects and clears the local repository cache. Never calls a producer.
//!
//! # Usage
//!
//! ```bash
//! repograde cached github.com/org/project --branch main
//! repograde rank github.com/org/project
//! repograde show github.com/org/project
//! repograde clear github.com/org/project
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repograde_orchestration::{cached_document, cached_rank, ServiceConfig};
use repograde_storage::{clear_repository, is_fully_cached, missing_keys, RepositoryId, SqliteStore};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "repograde")]
#[command(about = "Repograde - repository quality cache", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether all categories are cached
    Cached {
        /// Repository name, e.g. github.com/org/project
        repo: String,

        /// Branch (default branch when omitted)
        #[arg(short, long, default_value = "")]
        branch: String,
    },

    /// Print the cached rank letter
    Rank {
        repo: String,

        #[arg(short, long, default_value = "")]
        branch: String,
    },

    /// Print the cached document
    Show {
        repo: String,

        #[arg(short, long, default_value = "")]
        branch: String,
    },

    /// Drop every cached category
    Clear {
        repo: String,

        #[arg(short, long, default_value = "")]
        branch: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    setup_tracing(&config.log_level);

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    info!("Using cache at {}", config.database_path.display());

    match cli.command {
        Commands::Cached { repo, branch } => {
            let id = RepositoryId::new(repo, branch);
            if is_fully_cached(&store, &id).await? {
                println!("{}: cached", id);
            } else {
                let missing = missing_keys(&store, &id).await?;
                println!("{}: not cached ({} of 8 keys missing)", id, missing.len());
            }
        }
        Commands::Rank { repo, branch } => {
            let id = RepositoryId::new(repo, branch);
            match cached_rank(&store, &id).await? {
                Some(rank) => println!("{}", rank),
                None => println!("unavailable"),
            }
        }
        Commands::Show { repo, branch } => {
            let id = RepositoryId::new(repo, branch);
            let document = cached_document(&store, &id).await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Commands::Clear { repo, branch } => {
            let id = RepositoryId::new(repo, branch);
            let removed = clear_repository(&store, &id).await?;
            println!("{}: removed {} keys", id, removed);
        }
    }

    Ok(())
}

fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
