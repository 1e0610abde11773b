//! CLI command definitions for sprint-scheduler
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use clap::{Parser, Subcommand};

/// Sprint scheduler shard and maintenance tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scheduler shard until interrupted (default if no subcommand given)
    Serve,

    /// Release stale task claims once and exit
    Sweep,

    /// Print the task table as JSON
    Tasks,

    /// Run one sprint command as if typed in a chat channel
    Exec(ExecArgs),
}

/// Arguments for `exec`.
#[derive(clap::Args, Debug)]
pub struct ExecArgs {
    /// Guild (server) id
    #[arg(long, default_value_t = 1)]
    pub guild: i64,

    /// Channel id
    #[arg(long, default_value_t = 1)]
    pub channel: i64,

    /// Invoking user id
    #[arg(long, default_value_t = 1)]
    pub user: i64,

    /// Treat the user as having the manage-messages permission
    #[arg(long)]
    pub manager: bool,

    /// The words after `sprint`, e.g. `for 20 in 5`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub args: Vec<String>,
}
