//! # Repo Index CLI (`rix`)
//!
//! ## Usage
//!
//! ```bash
//! rix --config ./config/rix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rix init` | Create the SQLite database and run schema migrations |
//! | `rix add <repo-url>` | Register a repository (`pending`) |
//! | `rix list` | List registered repositories |
//! | `rix status <owner/repo>` | Show one repository record |
//! | `rix sync <owner/repo>` | Run one incremental sync |
//! | `rix inspect <owner/repo>` | Decode and summarize the stored vector object |
//! | `rix serve` | Start the HTTP API |
//!
//! Logs are written to stderr; set `RUST_LOG` (default `info`) to adjust.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use repo_index::{commands, config, migrate, server};

/// Repo Index: an incrementally synced vector index of GitHub issues and
/// pull requests.
#[derive(Parser)]
#[command(name = "rix", version, about = "Incremental vector index of GitHub issues and pull requests")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rix.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Register a repository by URL (`https://github.com/owner/repo`) or `owner/repo`.
    Add {
        repo_url: String,
    },

    /// List registered repositories.
    List,

    /// Show the status of one repository.
    Status {
        /// Repository as `owner/repo`.
        repo: String,
    },

    /// Run one sync for a repository.
    ///
    /// Requires the GitHub token variable (default `GITHUB_TOKEN`) and an
    /// embedding provider.
    Sync {
        /// Repository as `owner/repo`.
        repo: String,
    },

    /// Decode the stored vector object and print a summary.
    Inspect {
        /// Repository as `owner/repo`.
        repo: String,

        /// Also list every indexed item.
        #[arg(long)]
        verbose: bool,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add { repo_url } => {
            commands::run_add(&cfg, &repo_url).await?;
        }
        Commands::List => {
            commands::run_list(&cfg).await?;
        }
        Commands::Status { repo } => {
            commands::run_status(&cfg, &repo).await?;
        }
        Commands::Sync { repo } => {
            commands::run_sync(&cfg, &repo).await?;
        }
        Commands::Inspect { repo, verbose } => {
            commands::run_inspect(&cfg, &repo, verbose).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
