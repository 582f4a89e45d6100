use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::presigning::PresigningConfig;
use std::time::Duration;
use tracing::debug;

use super::{Metadata, PresignedRequest, StorageGateway, StoredObject, normalize_root};
use crate::config::StorageConfig;
use crate::errors::{RestoreError, Result};

/// Gateway over Amazon S3 and S3-compatible services (MinIO, R2, Spaces, OSS).
pub struct S3Gateway {
    client: s3::Client,
    bucket: String,
    root: String,
}

impl S3Gateway {
    pub async fn new(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                &credentials.access_key_id,
                &credentials.secret_access_key,
                None, // session_token
                None, // expiry
                "Static",
            ));
        }
        let sdk_config = loader.load().await;

        // Custom endpoints rarely support virtual-host addressing.
        let client = s3::Client::from_conf(
            s3::config::Builder::from(&sdk_config)
                .force_path_style(config.endpoint.is_some())
                .build(),
        );

        S3Gateway {
            client,
            bucket: config.bucket.clone(),
            root: normalize_root(config.root.as_deref()),
        }
    }

    fn full_key(&self, path: &str) -> String {
        format!("{}{}", self.root, path)
    }
}

fn to_utc(timestamp: &s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

#[async_trait]
impl StorageGateway for S3Gateway {
    async fn find(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        let full_prefix = self.full_key(prefix);
        debug!("Listing s3://{}/{}", self.bucket, full_prefix);

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&full_prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                RestoreError::Backend(format!(
                    "Failed to list objects under s3://{}/{}: {}",
                    self.bucket,
                    full_prefix,
                    DisplayErrorContext(&e)
                ))
            })?;
            for object in page.contents() {
                let Some(path) = object.key().and_then(|k| k.strip_prefix(&self.root)) else {
                    continue;
                };
                objects.push(StoredObject {
                    path: path.to_string(),
                    last_modified: object.last_modified().and_then(to_utc),
                });
            }
        }
        Ok(objects)
    }

    async fn metadata(&self, object: &StoredObject) -> Result<Metadata> {
        let key = self.full_key(&object.path);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(head) => Ok(Metadata {
                content_length: head.content_length().and_then(|l| u64::try_from(l).ok()),
                last_modified: head.last_modified().and_then(to_utc),
            }),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_not_found() {
                    Err(RestoreError::NotFound(format!("s3://{}/{}", self.bucket, key)))
                } else {
                    Err(RestoreError::Backend(format!(
                        "Failed to head object s3://{}/{}: {}",
                        self.bucket,
                        key,
                        DisplayErrorContext(&service_error)
                    )))
                }
            }
        }
    }

    async fn presign_read(&self, object: &StoredObject, ttl: Duration) -> Result<PresignedRequest> {
        let key = self.full_key(&object.path);
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| RestoreError::Backend(format!("Invalid presign window {:?}: {}", ttl, e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                RestoreError::Backend(format!(
                    "Failed to presign s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(PresignedRequest {
            method: request.method().to_string(),
            url: request.uri().to_string(),
            headers: request
                .headers()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
