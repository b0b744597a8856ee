//! CLI module
//!
//! - serve: load configuration, boot the HTTP server
//! - keygen: write a signing key file for `auth.key_file`

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{keygen, load_config, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
