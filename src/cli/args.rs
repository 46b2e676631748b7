//! CLI argument definitions using clap
//!
//! Commands:
//! - rawql query   [--config <path>] [--data <seed.json>] [--request <file>]
//! - rawql explain [--config <path>] [--request <file>]
//! - rawql check   [--config <path>] [--request <file>]
//!
//! Without `--request` the request is read from stdin.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rawql - one request shape, any backend
#[derive(Parser, Debug)]
#[command(name = "rawql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a single request and print the response envelope
    Query {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed file: `{"<entity>": [records...]}`
        #[arg(long)]
        data: Option<PathBuf>,

        /// Request file (defaults to stdin)
        #[arg(long)]
        request: Option<PathBuf>,
    },

    /// Print the native filter or pipeline of a request
    Explain {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Request file (defaults to stdin)
        #[arg(long)]
        request: Option<PathBuf>,
    },

    /// Validate a request's shape and print its normalized form
    Check {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Request file (defaults to stdin)
        #[arg(long)]
        request: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
