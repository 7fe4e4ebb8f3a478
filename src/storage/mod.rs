//! Object store access used by the uploader and the retention pass.
//!
//! Keys passed to and returned from an [`ObjectStore`] are artifact keys; any configured
//! bucket prefix is applied and stripped by the implementation.

pub(crate) mod s3;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::errors::StoreError;

pub use s3::S3Store;

/// An object as reported by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Cheap reachability probe for the configured bucket.
    async fn check(&self) -> Result<(), StoreError>;

    /// Streams the file at `path` to `key`.
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError>;

    /// Every object under the configured prefix, following pagination to the end.
    async fn list_objects(&self) -> Result<Vec<RemoteObject>, StoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;
}
