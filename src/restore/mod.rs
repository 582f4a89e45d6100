mod logic;
pub(crate) mod archive; // Archive listing and extraction
pub(crate) mod download; // Streaming fetch of presigned requests
pub(crate) mod fallback; // Secondary cache provider
pub(crate) mod resolver; // Restore-key matching

pub use logic::{RestoreOrchestrator, RestoreOutcome, RestoreSource};

use crate::config::RestoreConfig;
use crate::storage;
use crate::utils::state::{OUTPUT_CACHE_HIT, RunState, STATE_MATCHED_KEY};
use fallback::LocalDirFallback;
use tracing::debug;

/// Public entry point for the restore process.
///
/// Wires the configured backend, the local fallback cache and the runner
/// handoff files together and runs one restore.
pub async fn run_restore_flow(config: &RestoreConfig) -> RestoreOutcome {
    let gateway = storage::connect(&config.storage).await;
    let fallback = LocalDirFallback::new(
        config.fallback_dir.clone(),
        config.runner.workspace.clone(),
        config.runner.temp_root.clone(),
        config.runner.debug,
    );
    let mut state = RunState::new(
        config.runner.state_file.clone(),
        config.runner.output_file.clone(),
    );

    let outcome = RestoreOrchestrator::new(gateway.as_ref(), &fallback, &mut state)
        .run(config)
        .await;

    debug!(
        "Handoff: cache-hit={}, matched key={}",
        state.output(OUTPUT_CACHE_HIT).unwrap_or("false"),
        state.state(STATE_MATCHED_KEY).unwrap_or("<none>")
    );
    outcome
}
