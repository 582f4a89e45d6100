//! Cache Restore Tool
//!
//! Restores a saved build cache from object storage, falling back to a
//! secondary cache when the primary backend misses or fails.

// cache-restore/src/main.rs
mod config;
mod errors;
mod restore;
mod storage;
mod utils;

use anyhow::{Context, Result};
use config::{RestoreConfig, load_json_config};
use restore::{RestoreOutcome, RestoreSource};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH_VAR: &str = "CACHE_RESTORE_CONFIG";

/// Main entry point for the restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let vars: HashMap<String, String> = env::vars().collect();
    init_tracing(&vars);

    match run_app(&vars).await {
        Ok(outcome) => {
            match outcome.source {
                RestoreSource::Primary | RestoreSource::Fallback => info!(
                    "Restored {} (exact hit: {})",
                    outcome.matched_key.as_deref().unwrap_or_default(),
                    outcome.hit
                ),
                RestoreSource::None => info!("No cache restored"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(vars: &HashMap<String, String>) {
    let level = if vars.get("RUNNER_DEBUG").is_some_and(|v| v == "1") {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cache_restore={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Only configuration problems surface as errors; every storage, transfer
/// and fallback failure is already folded into the outcome.
async fn run_app(vars: &HashMap<String, String>) -> Result<RestoreOutcome> {
    let config_path = env::args()
        .nth(1)
        .or_else(|| vars.get(CONFIG_PATH_VAR).cloned())
        .map(PathBuf::from);

    let file_config = match &config_path {
        Some(path) => Some(load_json_config(path)?),
        None => None,
    };

    let config = RestoreConfig::from_env(vars, file_config.as_ref())
        .context("Failed to load restore configuration")?;

    Ok(restore::run_restore_flow(&config).await)
}
