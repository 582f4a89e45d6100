// cache-restore/src/restore/download.rs
use futures_util::TryStreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use crate::errors::{RestoreError, Result};
use crate::storage::PresignedRequest;

/// Streams the object behind `request` into `destination_path`.
///
/// The request is used as-is; no credentials are derived here. A failure
/// leaves a partial file behind that the caller must discard. No timeout is
/// applied beyond what the transport itself enforces.
pub async fn download(request: &PresignedRequest, destination_path: &Path) -> Result<u64> {
    let url = Url::parse(&request.url)
        .map_err(|e| RestoreError::Transfer(format!("Invalid presigned URL: {}", e)))?;

    if let Some(parent_dir) = destination_path.parent() {
        if !parent_dir.exists() {
            tokio::fs::create_dir_all(parent_dir).await?;
        }
    }

    debug!("Presigned request method: {}, path: {}", request.method, url.path());
    for (name, _) in &request.headers {
        debug!("Presigned request header: {}", name);
    }

    match url.scheme() {
        "http" | "https" => download_http(request, destination_path).await,
        "file" => copy_local(&url, destination_path).await,
        other => Err(RestoreError::Transfer(format!(
            "Unsupported URL scheme '{}' in presigned request",
            other
        ))),
    }
}

async fn download_http(request: &PresignedRequest, destination_path: &Path) -> Result<u64> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
        RestoreError::Transfer(format!("Invalid HTTP method '{}': {}", request.method, e))
    })?;

    let mut builder = reqwest::Client::new().request(method, &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    let response = builder.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RestoreError::Transfer(format!(
            "Unexpected HTTP status {} while downloading archive",
            status
        )));
    }

    let body = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(body);
    write_stream(&mut reader, destination_path).await
}

async fn copy_local(url: &Url, destination_path: &Path) -> Result<u64> {
    let source = url
        .to_file_path()
        .map_err(|_| RestoreError::Transfer(format!("Not a local file URL: {}", url)))?;
    let mut reader = File::open(&source).await.map_err(|e| {
        RestoreError::Transfer(format!("Failed to open {}: {}", source.display(), e))
    })?;
    write_stream(&mut reader, destination_path).await
}

async fn write_stream<R>(reader: &mut R, destination_path: &Path) -> Result<u64>
where
    R: tokio::io::AsyncRead + Unpin + ?Sized,
{
    let mut output_file = File::create(destination_path).await?;
    let total_bytes = tokio::io::copy(reader, &mut output_file).await.map_err(|e| {
        RestoreError::Transfer(format!(
            "Failed to write to destination file {}: {}",
            destination_path.display(),
            e
        ))
    })?;
    output_file.flush().await?;

    debug!(
        "Downloaded {} bytes to {}",
        total_bytes,
        destination_path.display()
    );
    Ok(total_bytes)
}
