// dbdump/src/storage/s3.rs
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::{BehaviorVersion, Credentials, Region};
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{ObjectStore, RemoteObject};
use crate::config::StorageConfig;
use crate::errors::StoreError;

const FALLBACK_REGION: &str = "us-east-1";
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// S3 or S3-compatible bucket, resolved once per process from [`StorageConfig`].
pub struct S3Store {
    client: s3::Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Store {
    pub async fn from_config(storage: &StorageConfig) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(storage.timeout.min(MAX_CONNECT_TIMEOUT))
            .operation_timeout(storage.timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);

        if let Some(region) = &storage.region {
            loader = loader.region(Region::new(region.clone()));
        } else if storage.endpoint.is_some() {
            // Most S3-compatible stores ignore the region but the signer still needs one.
            loader = loader.region(
                RegionProviderChain::default_provider().or_else(Region::new(FALLBACK_REGION)),
            );
        }
        if let Some(endpoint) = &storage.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(creds) = &storage.credentials {
            loader = loader.credentials_provider(Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(storage.endpoint.is_some())
            .build();

        info!(
            "Using bucket {} (endpoint: {}, prefix: {})",
            storage.bucket,
            storage.endpoint.as_deref().unwrap_or("AWS"),
            storage.prefix.as_deref().unwrap_or("<none>")
        );

        S3Store {
            client: s3::Client::from_conf(s3_config),
            bucket: storage.bucket.clone(),
            prefix: storage.prefix.clone(),
        }
    }

    fn err<E>(&self, operation: &'static str, error: E) -> StoreError
    where
        E: std::error::Error,
    {
        StoreError::new(operation, &self.bucket, DisplayErrorContext(error))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn check(&self) -> Result<(), StoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| self.err("HeadBucket", e))?;
        info!("✅ Target bucket {} is accessible", self.bucket);
        Ok(())
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| self.err("PutObject", e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(prefixed_key(self.prefix.as_deref(), key))
            .body(body)
            .send()
            .await
            .map_err(|e| self.err("PutObject", e))?;
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>, StoreError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(prefix) = &self.prefix {
                request = request.prefix(prefix);
            }
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }

            let page = request
                .send()
                .await
                .map_err(|e| self.err("ListObjectsV2", e))?;

            for object in page.contents() {
                let Some(full_key) = object.key() else { continue };
                let last_modified = object
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                    .unwrap_or_default();
                objects.push(RemoteObject {
                    key: unprefixed_key(self.prefix.as_deref(), full_key).to_string(),
                    last_modified,
                });
            }

            match next_page_token(page.is_truncated(), page.next_continuation_token()) {
                Some(token) => {
                    debug!("Listing continues after {} objects", objects.len());
                    continuation = Some(token);
                }
                None => break,
            }
        }

        Ok(objects)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(prefixed_key(self.prefix.as_deref(), key))
            .send()
            .await
            .map_err(|e| self.err("DeleteObject", e))?;
        Ok(())
    }
}

fn prefixed_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, key),
        None => key.to_string(),
    }
}

/// Keys outside the prefix come back unchanged.
fn unprefixed_key<'a>(prefix: Option<&str>, full_key: &'a str) -> &'a str {
    prefix
        .and_then(|prefix| full_key.strip_prefix(prefix))
        .unwrap_or(full_key)
}

/// Another page is requested only while the listing is truncated and a token was returned.
fn next_page_token(is_truncated: Option<bool>, token: Option<&str>) -> Option<String> {
    match (is_truncated, token) {
        (Some(true), Some(token)) if !token.is_empty() => Some(token.to_string()),
        _ => None,
    }
}
