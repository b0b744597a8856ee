//! Logging setup
//!
//! Installs a `tracing-subscriber` formatter on stderr, either human-readable
//! or JSON lines. `RUST_LOG` takes precedence over the configured level.

use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `timestamp LEVEL target: message fields`
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" | "jsonl" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Noisy dependencies held at warn unless overridden
const QUIET_TARGETS: &[&str] = &["hyper", "h2", "rustls", "reqwest", "tower_http"];

fn build_env_filter(level: &str) -> Result<EnvFilter, String> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = std::iter::once(level.to_string())
        .chain(QUIET_TARGETS.iter().map(|t| format!("{}=warn", t)))
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::try_new(&directives).map_err(|e| format!("invalid log filter '{}': {}", directives, e))
}

/// Install the global subscriber. Calling twice is harmless.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), String> {
    let filter = build_env_filter(level)?;

    let installed = match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_current_span(false)
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("global subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("JSONL".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_format_deserializes_lowercase() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
    }

    #[test]
    fn test_filter_accepts_level() {
        assert!(build_env_filter("debug").is_ok());
    }

    #[test]
    fn test_init_twice_is_ok() {
        assert!(init_logging("info", LogFormat::Compact).is_ok());
        assert!(init_logging("info", LogFormat::Json).is_ok());
    }
}
