//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::RunMode;

/// autopost: publishes scheduled or feed-driven posts to a Telegram channel
#[derive(Parser, Debug)]
#[command(name = "autopost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the source and publish due posts
    Run(RunArgs),

    /// One-shot generation of a post from a hint
    Compose(ComposeArgs),

    /// Manage the local SQLite post table
    Queue(QueueArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run in dry-run mode (no actual publishing)
    #[arg(long)]
    pub dry_run: bool,

    /// Process one poll cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Override the configured source mode
    #[arg(long, value_enum)]
    pub mode: Option<RunMode>,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Theme or source material for the post
    #[arg(long)]
    pub hint: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Append a pending post
    Add {
        /// Post text
        #[arg(long)]
        text: Option<String>,

        /// Title used as generation hint when there is no text
        #[arg(long)]
        title: Option<String>,

        /// Image URL (sent as photo with the text as caption)
        #[arg(long)]
        image: Option<String>,

        /// Publish time, "YYYY-MM-DD HH:MM" in UTC; empty publishes on the next cycle
        #[arg(long)]
        at: Option<String>,
    },

    /// List all posts with their status
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
