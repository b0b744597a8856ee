//! CLI argument definitions using clap
//!
//! Commands:
//! - todo-rls serve [--config <path>]
//! - todo-rls keygen --out <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Session-token bridge between a cookie session store and a row-level-secured todo store
#[derive(Parser, Debug)]
#[command(name = "todo-rls")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file (default: ./todo-rls.json when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a fresh Ed25519 signing key
    Keygen {
        /// Where to write the key; an existing file is never overwritten
        #[arg(long)]
        out: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
