//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Indexed user store with periodic backups
#[derive(Parser, Debug)]
#[command(name = "user-service")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print aggregate statistics as JSON
    Stats,
    /// List every user
    List,
    /// Search users by name or email
    Search {
        /// Space-separated terms (any may match)
        query: String,
    },
    /// Create a user
    Create(CreateArgs),
    /// Delete a user by id
    Delete { id: Uuid },
    /// Export users as CSV
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import users from a CSV file
    Import { file: PathBuf },
    /// Take a backup snapshot now
    Backup,
    /// List backup snapshots
    Backups,
    /// Restore the table from a backup snapshot
    Restore { key: String },
    /// Check table/index consistency
    Verify,
    /// Run scheduled backups until Ctrl+C
    Watch,
}

/// Arguments for the create command
#[derive(Parser, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub name: String,

    #[arg(long, env = "USER_STORE_NEW_PASSWORD")]
    pub password: String,

    /// user, admin or moderator
    #[arg(long, default_value = "user")]
    pub role: String,
}
