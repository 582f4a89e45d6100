use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use url::Url;
use walkdir::WalkDir;

use super::{Metadata, PresignedRequest, StorageGateway, StoredObject, normalize_root};
use crate::errors::{RestoreError, Result};

/// A directory tree used as a bucket. Object paths use `/` separators.
pub struct FsGateway {
    base: PathBuf,
}

impl FsGateway {
    pub fn new(bucket: impl AsRef<Path>, root: Option<&str>) -> Self {
        let root = normalize_root(root);
        FsGateway {
            base: bucket.as_ref().join(root.trim_end_matches('/')),
        }
    }

    /// `None` when the name would leave the bucket (`..`, absolute paths).
    fn object_path(&self, object: &StoredObject) -> Option<PathBuf> {
        let relative = Path::new(&object.path);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        (contained && !object.path.is_empty()).then(|| self.base.join(relative))
    }
}

fn relative_name(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[async_trait]
impl StorageGateway for FsGateway {
    async fn find(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        if !self.base.is_dir() {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.base).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = relative_name(&self.base, entry.path()) else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }
            let last_modified = entry
                .metadata()?
                .modified()
                .ok()
                .map(DateTime::<Utc>::from);
            objects.push(StoredObject {
                path: name,
                last_modified,
            });
        }
        Ok(objects)
    }

    async fn metadata(&self, object: &StoredObject) -> Result<Metadata> {
        let Some(path) = self.object_path(object) else {
            return Err(RestoreError::NotFound(format!(
                "{} is not a name inside the bucket",
                object.path
            )));
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Metadata {
                content_length: Some(meta.len()),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            }),
            Ok(_) => Err(RestoreError::NotFound(path.display().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(RestoreError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(RestoreError::Backend(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn presign_read(&self, object: &StoredObject, _ttl: Duration) -> Result<PresignedRequest> {
        let path = self.object_path(object).ok_or_else(|| {
            RestoreError::Backend(format!("{} is not a name inside the bucket", object.path))
        })?;
        let absolute = tokio::fs::canonicalize(&path).await.map_err(|e| {
            RestoreError::Backend(format!("Failed to resolve {}: {}", path.display(), e))
        })?;
        let url = Url::from_file_path(&absolute).map_err(|_| {
            RestoreError::Backend(format!("Cannot express {} as a URL", absolute.display()))
        })?;

        Ok(PresignedRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: Vec::new(),
        })
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn bucket_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file.as_bytes()).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_find_filters_by_prefix_under_root() -> anyhow::Result<()> {
        let dir = bucket_with(&[
            "ci/build-1.tgz",
            "ci/build-2.tgz",
            "ci/deps-1.tgz",
            "other/build-3.tgz",
        ]);
        let gateway = FsGateway::new(dir.path(), Some("ci"));

        let mut names: Vec<String> = gateway
            .find("build-")
            .await?
            .into_iter()
            .map(|o| o.path)
            .collect();
        names.sort();
        assert_eq!(names, vec!["build-1.tgz", "build-2.tgz"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_uses_slash_separated_names() -> anyhow::Result<()> {
        let dir = bucket_with(&["linux/cargo-abc.tgz"]);
        let gateway = FsGateway::new(dir.path(), None);

        let found = gateway.find("linux/cargo-").await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "linux/cargo-abc.tgz");
        assert!(found[0].last_modified.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_find_on_missing_bucket_is_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let gateway = FsGateway::new(dir.path().join("absent"), None);
        assert!(gateway.find("").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_reports_length_and_not_found() -> anyhow::Result<()> {
        let dir = bucket_with(&["key.tgz"]);
        let gateway = FsGateway::new(dir.path(), None);

        let meta = gateway.metadata(&StoredObject::new("key.tgz")).await?;
        assert_eq!(meta.content_length, Some("key.tgz".len() as u64));

        let missing = gateway.metadata(&StoredObject::new("nope.tgz")).await;
        assert!(matches!(missing, Err(RestoreError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_presign_read_yields_file_url() -> anyhow::Result<()> {
        let dir = bucket_with(&["key.tgz"]);
        let gateway = FsGateway::new(dir.path(), None);

        let request = gateway
            .presign_read(&StoredObject::new("key.tgz"), Duration::from_secs(600))
            .await?;
        assert_eq!(request.method, "GET");
        assert!(request.url.starts_with("file://"));
        assert!(request.url.ends_with("/key.tgz"));
        assert!(request.headers.is_empty());

        let missing = gateway
            .presign_read(&StoredObject::new("nope.tgz"), Duration::from_secs(600))
            .await;
        assert!(matches!(missing, Err(RestoreError::Backend(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_names_cannot_escape_the_bucket() -> anyhow::Result<()> {
        let dir = bucket_with(&["bucket/ci/inside.tgz", "secret.tgz", "bucket/outside-root.tgz"]);
        let gateway = FsGateway::new(dir.path().join("bucket"), Some("ci"));
        let absolute = dir.path().join("secret.tgz").display().to_string();

        for name in ["../../secret.tgz", "../outside-root.tgz", "./inside.tgz", absolute.as_str()] {
            let object = StoredObject::new(name);
            assert!(
                matches!(gateway.metadata(&object).await, Err(RestoreError::NotFound(_))),
                "{name}"
            );
            assert!(
                matches!(
                    gateway.presign_read(&object, Duration::from_secs(600)).await,
                    Err(RestoreError::Backend(_))
                ),
                "{name}"
            );
        }

        assert!(gateway.metadata(&StoredObject::new("inside.tgz")).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_parent_key_resolves_to_miss() -> anyhow::Result<()> {
        use crate::restore::archive::CompressionMethod;
        use crate::restore::resolver::resolve;

        let dir = bucket_with(&["secret.tgz"]);
        fs::create_dir_all(dir.path().join("bucket"))?;
        let gateway = FsGateway::new(dir.path().join("bucket"), None);

        let result = resolve(&gateway, "../secret", &[], CompressionMethod::Gzip).await;
        assert!(matches!(result, Err(RestoreError::NotFound(_))));
        Ok(())
    }
}
