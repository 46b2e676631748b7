//! Command-line interface for rawql
//!
//! - query: execute one request against a document adapter
//! - explain: print the native query a request translates to
//! - check: decode and shape-check a request without executing it

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, execute, explain, plan, query, run, run_command};
pub use config::Config;
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_file, read_request, write_json};
