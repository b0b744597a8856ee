//! CLI command implementations

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use crate::auth::SigningKey;
use crate::config::AppConfig;
use crate::http_server::{AppState, HttpServer};
use crate::observability::{init_logging, Event};

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "./todo-rls.json";

pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(config.as_deref()),
        Command::Keygen { out } => {
            let kid = keygen(&out)?;
            println!("{}", json!({ "kid": kid, "path": out.display().to_string() }));
            Ok(())
        }
    }
}

/// An explicit path must exist. Without one, the default path is used when
/// present and built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    match path {
        Some(path) => Ok(AppConfig::load(path)?),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Ok(AppConfig::load(&default)?)
            } else {
                Ok(AppConfig::default())
            }
        }
    }
}

/// Boot the HTTP server and serve until it stops
pub fn serve(config_path: Option<&Path>) -> CliResult<()> {
    let config = load_config(config_path)?;
    init_logging(&config.logging.level, config.logging.format).map_err(CliError::boot_failed)?;

    tracing::info!(
        event = %Event::ConfigLoaded,
        path = ?config_path,
        issuer = %config.auth.issuer,
        token_ttl_secs = config.auth.access_token_ttl_secs,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let state = AppState::from_config(&config)
            .map_err(|e| CliError::key_error(e.to_string()))?;

        let mut server = HttpServer::new(config.server.clone(), state);
        if let Some(secs) = config.auth.rotation_interval_secs {
            server = server.with_rotation(Duration::from_secs(secs));
        }

        server
            .start()
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Write a new signing key to `out`; returns its key id
pub fn keygen(out: &Path) -> CliResult<String> {
    let key = SigningKey::generate().map_err(|e| CliError::key_error(e.to_string()))?;
    key.write_to(out)
        .map_err(|e| CliError::key_error(e.to_string()))?;
    Ok(key.kid().to_string())
}
