//! convoy - migration store operations
//!
//! CLI for inspecting and repairing the shared lock and ledger databases
//! that convoy runners coordinate through.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// convoy - migration store operations
#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "convoy.toml")]
    config: PathBuf,

    /// Path to the store database (overrides the configuration)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the lock row and the latest recorded state per migration
    Status {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print ledger entries, newest first
    History {
        /// Only entries for this migration id
        #[arg(long)]
        id: Option<String>,

        /// Only entries by this author
        #[arg(long)]
        author: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Remove a wedged lock row
    Unlock {
        /// Owner of the lease to remove; required while the lease is live
        #[arg(long)]
        owner: Option<String>,
    },

    /// Load the configuration file and print the effective settings
    Validate {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = commands::load_config(&cli.config)?;
    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| config.store.path.clone());

    match cli.command {
        Commands::Status { json } => commands::status::run(&store_path, &config.lock.key, json),
        Commands::History { id, author, json } => {
            commands::history::run(&store_path, id.as_deref(), author.as_deref(), json)
        },
        Commands::Unlock { owner } => {
            commands::unlock::run(&store_path, &config.lock.key, owner.as_deref())
        },
        Commands::Validate { json } => commands::validate::run(&cli.config, json),
    }
}
