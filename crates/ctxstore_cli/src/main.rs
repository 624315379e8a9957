//! ctxstore CLI - manage user records in a file-backed context store.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod commands;

#[derive(Parser)]
#[command(name = "ctxstore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the database file
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Model name; also the database file stem
    #[arg(short, long, default_value = "Model")]
    model: String,

    /// Write rolling log files into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check core linkage
    Ping,

    /// Insert a user record
    Insert {
        /// User name
        name: String,

        /// Optional age
        #[arg(short, long)]
        age: Option<i64>,
    },

    /// List user records sorted by name
    List {
        /// Only users whose name contains this text
        #[arg(short, long)]
        contains: Option<String>,
    },

    /// Delete a user record by id
    Delete {
        /// Record identifier
        id: uuid::Uuid,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let log_dir = absolute(log_dir)?;
        let level = cli
            .log_level
            .as_deref()
            .unwrap_or(ctxstore_core::default_log_level());
        ctxstore_core::init_logging(level, &log_dir.to_string_lossy())
            .map_err(|err| anyhow!("failed to initialize logging: {err}"))?;
    }

    let data_dir = absolute(&cli.data_dir)?;
    match cli.command {
        Commands::Ping => commands::ping(),
        Commands::Insert { name, age } => commands::insert(&data_dir, &cli.model, name, age),
        Commands::List { contains } => commands::list(&data_dir, &cli.model, contains),
        Commands::Delete { id } => commands::delete(&data_dir, &cli.model, id),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}
