// cache-restore/src/restore/archive.rs
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;
use tar::Archive;
use tracing::info;

use crate::errors::{RestoreError, Result};

/// Codec an archive was written with. Objects are namespaced by it through
/// their key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    #[default]
    Gzip,
}

impl CompressionMethod {
    /// Appended to every cache key to form an object name.
    pub fn archive_suffix(&self) -> &'static str {
        match self {
            CompressionMethod::Gzip => ".tgz",
        }
    }

    /// Local file name of the downloaded archive.
    pub fn cache_file_name(&self) -> &'static str {
        match self {
            CompressionMethod::Gzip => "cache.tgz",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompressionMethod::Gzip => "gzip",
        }
    }
}

fn open_archive(archive_path: &Path, method: CompressionMethod) -> Result<Archive<GzDecoder<File>>> {
    if !archive_path.is_file() {
        return Err(RestoreError::CorruptArchive(format!(
            "Archive for extraction is not a file: {}",
            archive_path.display()
        )));
    }
    let archive_file = File::open(archive_path)?;
    match method {
        CompressionMethod::Gzip => Ok(Archive::new(GzDecoder::new(archive_file))),
    }
}

/// Entry paths inside the archive, without touching the filesystem.
pub fn list_contents(archive_path: &Path, method: CompressionMethod) -> Result<Vec<String>> {
    let mut archive = open_archive(archive_path, method)?;
    let corrupt = |e: std::io::Error| {
        RestoreError::CorruptArchive(format!("{}: {}", archive_path.display(), e))
    };

    let mut names = Vec::new();
    for entry in archive.entries().map_err(corrupt)? {
        let entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?;
        names.push(path.display().to_string());
    }
    Ok(names)
}

/// Extracts the archive into `workspace`, overwriting existing files.
pub fn unpack(archive_path: &Path, method: CompressionMethod, workspace: &Path) -> Result<()> {
    if !workspace.exists() {
        std::fs::create_dir_all(workspace)?;
    } else if !workspace.is_dir() {
        return Err(RestoreError::Io(std::io::Error::other(format!(
            "Extraction path exists but is not a directory: {}",
            workspace.display()
        ))));
    }

    info!(
        "Extracting {} archive {} to {}",
        method.name(),
        archive_path.display(),
        workspace.display()
    );

    let mut archive = open_archive(archive_path, method)?;
    archive.set_overwrite(true);
    archive.set_preserve_mtime(true);
    archive.unpack(workspace).map_err(|e| {
        RestoreError::CorruptArchive(format!(
            "Failed to unpack archive {} to {}: {}",
            archive_path.display(),
            workspace.display(),
            e
        ))
    })
}

/// Test fixture: packs `source_dir` the same way the save side does.
#[cfg(test)]
pub(crate) fn create_tar_gz_archive(source_dir: &Path, archive_dest_path: &Path) -> anyhow::Result<()> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use walkdir::WalkDir;

    if let Some(parent) = archive_dest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let enc = GzEncoder::new(File::create(archive_dest_path)?, Compression::default());
    let mut tar_builder = tar::Builder::new(enc);

    for entry in WalkDir::new(source_dir) {
        let entry = entry?;
        let path = entry.path();
        let name = path.strip_prefix(source_dir)?;
        if name.as_os_str().is_empty() {
            continue;
        }
        if path.is_file() {
            tar_builder.append_path_with_name(path, name)?;
        }
    }
    tar_builder.into_inner()?.finish()?;
    Ok(())
}
