//! Outflow CLI
//!
//! Command-line front end over a SQLite change log.
//!
//! # Commands
//!
//! - `init` - Create the change log schema
//! - `write` - Record one local transaction
//! - `pending` - List changes waiting to be propagated
//! - `sync` - Propagate pending changes to the remote API

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Outflow local-first write path tools.
#[derive(Parser)]
#[command(name = "outflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database file
    #[arg(global = true, short, long, env = "OUTFLOW_DB")]
    db: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the change log schema
    Init,

    /// Record one local transaction, one change per value
    Write {
        /// Operation (insert, update, delete)
        #[arg(short, long)]
        op: String,

        /// Row value as a JSON object; repeat for more changes
        #[arg(long = "value", required = true)]
        values: Vec<String>,
    },

    /// List changes waiting to be propagated
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Propagate pending changes to the remote API
    Sync {
        /// Base URL of the API
        #[arg(short, long, env = "OUTFLOW_API_BASE")]
        api_base: String,

        /// Relation named in each mutation
        #[arg(short, long, default_value = "users")]
        relation: String,

        /// Pause between cycles in milliseconds
        #[arg(long, default_value = "1000")]
        retry_delay_ms: u64,

        /// Per-request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Keep running until interrupted
        #[arg(short, long)]
        watch: bool,

        /// In watch mode, how often to check for writes from other processes
        #[arg(long, default_value = "500")]
        poll_ms: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Init => {
            let path = cli.db.ok_or("Database path required for init")?;
            commands::init::run(&path)?;
        }
        Commands::Write { op, values } => {
            let path = cli.db.ok_or("Database path required for write")?;
            commands::write::run(&path, &op, &values)?;
        }
        Commands::Pending { format } => {
            let path = cli.db.ok_or("Database path required for pending")?;
            commands::pending::run(&path, &format)?;
        }
        Commands::Sync {
            api_base,
            relation,
            retry_delay_ms,
            timeout_ms,
            watch,
            poll_ms,
        } => {
            let path = cli.db.ok_or("Database path required for sync")?;
            let options = commands::sync::SyncOptions {
                api_base,
                relation,
                retry_delay_ms,
                timeout_ms,
                poll_ms,
                watch,
            };
            tokio::runtime::Runtime::new()?.block_on(commands::sync::run(&path, options))?;
        }
        Commands::Version => {
            println!("Outflow CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
