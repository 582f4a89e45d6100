use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::archive::{self, CompressionMethod};
use super::download;
use super::fallback::FallbackCache;
use super::resolver::{self, MatchResult};
use crate::config::RestoreConfig;
use crate::errors::{Disposition, RestoreError, Result};
use crate::storage::StorageGateway;
use crate::utils::format_size;
use crate::utils::is_ghes;
use crate::utils::state::{
    OUTPUT_CACHE_HIT, OUTPUT_MATCHED_KEY, RunState, STATE_MATCHED_KEY, STATE_PRIMARY_KEY,
};

/// How long a presigned read stays valid.
pub const PRESIGN_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    Primary,
    Fallback,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// True only when the restored key equals the primary key exactly.
    pub hit: bool,
    pub source: RestoreSource,
    pub matched_key: Option<String>,
}

impl RestoreOutcome {
    fn miss() -> Self {
        RestoreOutcome {
            hit: false,
            source: RestoreSource::None,
            matched_key: None,
        }
    }
}

pub(crate) fn temp_directory(root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("cache-restore-");
    let dir = match root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}

fn join_error(err: tokio::task::JoinError) -> RestoreError {
    RestoreError::Io(std::io::Error::other(err))
}

/// Presign, download and unpack one resolved object. Returns bytes downloaded.
pub(crate) async fn fetch_and_extract(
    gateway: &dyn StorageGateway,
    matched: &MatchResult,
    archive_path: &Path,
    method: CompressionMethod,
    workspace: &Path,
    verbose: bool,
) -> Result<u64> {
    let request = gateway.presign_read(&matched.object, PRESIGN_TTL).await?;

    let download_started = Instant::now();
    debug!("Starting download of {} from {}", matched.object, gateway.name());
    let bytes = download::download(&request, archive_path).await?;
    debug!(
        "Finished download in {:.3}s",
        download_started.elapsed().as_secs_f64()
    );

    // Archive reads are blocking std I/O; keep them off the runtime thread.
    if verbose {
        let path = archive_path.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || archive::list_contents(&path, method))
            .await
            .map_err(join_error)??;
        for entry in entries {
            debug!("{}", entry);
        }
    }

    let size = matched.metadata.content_length.unwrap_or(0);
    info!("Cache Size: {} ({} bytes)", format_size(size), size);

    let extract_started = Instant::now();
    let (path, target) = (archive_path.to_path_buf(), workspace.to_path_buf());
    tokio::task::spawn_blocking(move || archive::unpack(&path, method, &target))
        .await
        .map_err(join_error)??;
    debug!(
        "Finished extraction in {:.3}s",
        extract_started.elapsed().as_secs_f64()
    );
    Ok(bytes)
}

/// Runs one restore: primary backend first, fallback cache on any failure.
pub struct RestoreOrchestrator<'a> {
    gateway: &'a dyn StorageGateway,
    fallback: &'a dyn FallbackCache,
    state: &'a mut RunState,
    method: CompressionMethod,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(
        gateway: &'a dyn StorageGateway,
        fallback: &'a dyn FallbackCache,
        state: &'a mut RunState,
    ) -> Self {
        RestoreOrchestrator {
            gateway,
            fallback,
            state,
            method: CompressionMethod::default(),
        }
    }

    pub async fn run(&mut self, config: &RestoreConfig) -> RestoreOutcome {
        // A later save step re-reads its inputs; it needs the key as given now.
        self.save_state(STATE_PRIMARY_KEY, &config.key);

        match self.restore_primary(config).await {
            Ok(matched) => {
                let hit = matched.matched_key == config.key;
                self.save_state(STATE_MATCHED_KEY, &matched.matched_key);
                self.report(hit, &matched.matched_key);
                info!("Cache restored from {} successfully", self.gateway.name());
                return RestoreOutcome {
                    hit,
                    source: RestoreSource::Primary,
                    matched_key: Some(matched.matched_key),
                };
            }
            Err(err) => {
                info!("Restore {} cache failed: {}", self.gateway.name(), err);
                self.set_output(OUTPUT_CACHE_HIT, "false");
            }
        }

        if !config.use_fallback {
            return RestoreOutcome::miss();
        }
        if is_ghes(config.runner.server_url.as_deref()) {
            warn!("Cache fallback is not supported on GitHub Enterprise Server.");
            return RestoreOutcome::miss();
        }

        info!("Restore cache using fallback cache");
        match self
            .fallback
            .restore(&config.paths, &config.key, &config.restore_keys)
            .await
        {
            Ok(Some(matched_key)) => {
                let hit = matched_key == config.key;
                self.save_state(STATE_MATCHED_KEY, &matched_key);
                self.report(hit, &matched_key);
                info!("Fallback cache restored successfully");
                RestoreOutcome {
                    hit,
                    source: RestoreSource::Fallback,
                    matched_key: Some(matched_key),
                }
            }
            Ok(None) => {
                info!("Fallback cache restore failed");
                RestoreOutcome::miss()
            }
            Err(err) => {
                if err.disposition() != Disposition::WarnOnly {
                    debug!("Unexpected error kind from fallback cache: {:?}", err);
                }
                warn!("Fallback cache restore failed: {}", err);
                RestoreOutcome::miss()
            }
        }
    }

    async fn restore_primary(&self, config: &RestoreConfig) -> Result<MatchResult> {
        let temp_dir = temp_directory(config.runner.temp_root.as_deref())?;
        let archive_path = temp_dir.path().join(self.method.cache_file_name());

        let matched =
            resolver::resolve(self.gateway, &config.key, &config.restore_keys, self.method).await?;
        info!(
            "Downloading cache from {} to {}. bucket: {}, root: {}, object: {}",
            self.gateway.name(),
            archive_path.display(),
            config.storage.bucket,
            config.storage.root.as_deref().unwrap_or(""),
            matched.object
        );

        fetch_and_extract(
            self.gateway,
            &matched,
            &archive_path,
            self.method,
            &config.runner.workspace,
            config.runner.debug,
        )
        .await?;
        Ok(matched)
    }

    fn report(&mut self, hit: bool, matched_key: &str) {
        self.set_output(OUTPUT_CACHE_HIT, if hit { "true" } else { "false" });
        self.set_output(OUTPUT_MATCHED_KEY, matched_key);
    }

    // Handoff write failures must not turn a restore into a failure; the
    // in-memory record is still updated.
    fn save_state(&mut self, name: &str, value: &str) {
        if let Err(e) = self.state.save_state(name, value) {
            warn!("Failed to persist state {}: {}", name, e);
        }
    }

    fn set_output(&mut self, name: &str, value: &str) {
        if let Err(e) = self.state.set_output(name, value) {
            warn!("Failed to write output {}: {}", name, e);
        }
    }
}
