//! Shared helper functions for CLI commands

use metaloop_core::config::{
    TracePaths, DEFAULT_CONFIG_PATH, DEFAULT_RECEIPTS_PATH, DEFAULT_STATE_PATH,
};
use metaloop_core::types::Telemetry;
use metaloop_core::{MetaLoopError, Result};
use serde::Serialize;
use std::path::PathBuf;

/// Paths from CLI flags (which clap already falls back to the environment
/// for), then the fixed defaults.
pub fn resolve_paths(
    config: Option<PathBuf>,
    state: Option<PathBuf>,
    receipts: Option<PathBuf>,
) -> TracePaths {
    TracePaths {
        config: config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        state: state.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
        receipts: receipts.unwrap_or_else(|| PathBuf::from(DEFAULT_RECEIPTS_PATH)),
    }
}

pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

/// Parse `key=value` pairs into telemetry
pub fn parse_telemetry(pairs: &[String]) -> Result<Telemetry> {
    let mut telemetry = Telemetry::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| MetaLoopError::Other(format!("expected KEY=VALUE, got '{}'", pair)))?;
        let value: f64 = value.trim().parse().map_err(|e| {
            MetaLoopError::Other(format!("invalid number for '{}': {}", key.trim(), e))
        })?;
        telemetry.insert(key.trim().to_string(), value);
    }
    Ok(telemetry)
}
