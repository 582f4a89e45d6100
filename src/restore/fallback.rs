use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::info;

use super::archive::CompressionMethod;
use super::logic::{fetch_and_extract, temp_directory};
use super::resolver;
use crate::errors::{RestoreError, Result};
use crate::storage::fs::FsGateway;

const MAX_KEY_LENGTH: usize = 512;
const MAX_KEY_COUNT: usize = 10;
const VERSION_SALT: &str = "1.0";

/// Secondary cache service, consulted only after the primary path failed.
#[async_trait]
pub trait FallbackCache: Send + Sync {
    /// Restore `paths` from the best entry for `primary_key` or one of the
    /// `restore_keys` prefixes. Returns the key that was restored, if any.
    async fn restore(
        &self,
        paths: &[String],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<String>>;
}

/// Fallback cache kept in a directory on the runner, laid out as
/// `<root>/<version>/<key>.tgz` where the version hashes the cached paths.
pub struct LocalDirFallback {
    root: Option<PathBuf>,
    workspace: PathBuf,
    temp_root: Option<PathBuf>,
    debug: bool,
    method: CompressionMethod,
}

impl LocalDirFallback {
    pub fn new(
        root: Option<PathBuf>,
        workspace: PathBuf,
        temp_root: Option<PathBuf>,
        debug: bool,
    ) -> Self {
        LocalDirFallback {
            root,
            workspace,
            temp_root,
            debug,
            method: CompressionMethod::default(),
        }
    }
}

/// Entries are only shared between runs that cache the same paths with the
/// same codec.
pub fn cache_version(paths: &[String], method: CompressionMethod) -> String {
    let mut components: Vec<&str> = paths.iter().map(String::as_str).collect();
    components.push(method.name());
    components.push(VERSION_SALT);
    hex::encode(Sha256::digest(components.join("|").as_bytes()))
}

fn validate_inputs(paths: &[String], primary_key: &str, restore_keys: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Err(RestoreError::Fallback(
            "Path Validation Error: At least one directory or file path is required to restore cache"
                .to_string(),
        ));
    }
    if restore_keys.len() + 1 > MAX_KEY_COUNT {
        return Err(RestoreError::Fallback(format!(
            "Key Validation Error: Keys are limited to a maximum of {}",
            MAX_KEY_COUNT
        )));
    }
    for key in std::iter::once(primary_key).chain(restore_keys.iter().map(String::as_str)) {
        if key.len() > MAX_KEY_LENGTH {
            return Err(RestoreError::Fallback(format!(
                "Key Validation Error: {} cannot be larger than {} characters",
                key, MAX_KEY_LENGTH
            )));
        }
        if key.contains(',') {
            return Err(RestoreError::Fallback(format!(
                "Key Validation Error: {} cannot contain commas",
                key
            )));
        }
    }
    Ok(())
}

fn into_fallback_error(err: RestoreError) -> RestoreError {
    match err {
        RestoreError::Fallback(_) => err,
        other => RestoreError::Fallback(other.to_string()),
    }
}

#[async_trait]
impl FallbackCache for LocalDirFallback {
    async fn restore(
        &self,
        paths: &[String],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<String>> {
        validate_inputs(paths, primary_key, restore_keys)?;

        let Some(root) = &self.root else {
            info!("No fallback cache directory configured");
            return Ok(None);
        };

        let version = cache_version(paths, self.method);
        let gateway = FsGateway::new(root.join(&version), None);

        let matched = match resolver::resolve(&gateway, primary_key, restore_keys, self.method).await {
            Ok(matched) => matched,
            Err(RestoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(into_fallback_error(e)),
        };

        let temp_dir = temp_directory(self.temp_root.as_deref()).map_err(into_fallback_error)?;
        let archive_path = temp_dir.path().join(self.method.cache_file_name());
        fetch_and_extract(
            &gateway,
            &matched,
            &archive_path,
            self.method,
            &self.workspace,
            self.debug,
        )
        .await
        .map_err(into_fallback_error)?;

        Ok(Some(matched.matched_key))
    }
}
