//! Object storage abstraction
//!
//! Every backend exposes the same three capabilities: prefix listing,
//! metadata lookup and presigned reads. The backend is chosen once from
//! configuration and used through `dyn StorageGateway` for the whole run.

pub(crate) mod fs;
pub(crate) mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::errors::{RestoreError, Result};

/// An object inside the backend, addressed relative to the configured root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl StoredObject {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }
}

impl fmt::Display for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A time-limited descriptor for reading exactly one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Uniform capability over a configured object-storage backend.
///
/// Implementations never retry; a failed call is reported once.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// List every object whose path starts with `prefix`. May be empty.
    async fn find(&self, prefix: &str) -> Result<Vec<StoredObject>>;

    /// Look up metadata, failing with `NotFound` when the object is gone.
    async fn metadata(&self, object: &StoredObject) -> Result<Metadata>;

    /// Produce a read request valid for `ttl`.
    async fn presign_read(&self, object: &StoredObject, ttl: Duration) -> Result<PresignedRequest>;

    /// Human-readable backend name for logs
    fn name(&self) -> &'static str;
}

/// Backend drivers this tool knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Amazon S3 or any S3-compatible service
    S3,
    /// A local directory acting as a bucket
    Fs,
}

impl FromStr for Provider {
    type Err = RestoreError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "s3" | "minio" | "r2" | "spaces" | "oss" => Ok(Provider::S3),
            "fs" => Ok(Provider::Fs),
            other => Err(RestoreError::Config(format!(
                "Unsupported storage provider '{}'. Expected one of: s3, minio, r2, spaces, oss, fs",
                other
            ))),
        }
    }
}

/// Build the gateway for the configured provider.
pub async fn connect(config: &StorageConfig) -> Box<dyn StorageGateway> {
    match config.provider {
        Provider::S3 => Box::new(s3::S3Gateway::new(config).await),
        Provider::Fs => Box::new(fs::FsGateway::new(&config.bucket, config.root.as_deref())),
    }
}

/// Turn an optional root into a key prefix: `""` or `"cache/"`.
pub(crate) fn normalize_root(root: Option<&str>) -> String {
    match root.map(|r| r.trim_matches('/')) {
        Some(r) if !r.is_empty() => format!("{}/", r),
        _ => String::new(),
    }
}
