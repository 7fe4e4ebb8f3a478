// In-process ObjectStore for exercising upload and retention without a bucket.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ObjectStore, RemoteObject};
use crate::errors::StoreError;

const BUCKET: &str = "memory-bucket";

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, (DateTime<Utc>, Vec<u8>)>>,
    failing_deletes: BTreeSet<String>,
    reject_puts: bool,
    unreachable: bool,
    pub list_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn with_objects<'a>(objects: impl IntoIterator<Item = (&'a str, DateTime<Utc>)>) -> Self {
        let store = MemoryStore::default();
        {
            let mut map = store.objects.lock().unwrap();
            for (key, at) in objects {
                map.insert(key.to_string(), (at, Vec::new()));
            }
        }
        store
    }

    pub fn failing_delete_of(mut self, key: &str) -> Self {
        self.failing_deletes.insert(key.to_string());
        self
    }

    pub fn rejecting_puts(mut self) -> Self {
        self.reject_puts = true;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn contents(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|(_, body)| body.clone())
    }

    fn refuse(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.unreachable {
            return Err(StoreError::new(operation, BUCKET, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        BUCKET
    }

    async fn check(&self) -> Result<(), StoreError> {
        self.refuse("HeadBucket")
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        self.refuse("PutObject")?;
        if self.reject_puts {
            return Err(StoreError::new("PutObject", BUCKET, "AccessDenied"));
        }
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::new("PutObject", BUCKET, e))?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Utc::now(), body));
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.refuse("ListObjectsV2")?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, (at, _))| RemoteObject {
                key: key.clone(),
                last_modified: *at,
            })
            .collect())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.refuse("DeleteObject")?;
        if self.failing_deletes.contains(key) {
            return Err(StoreError::new("DeleteObject", BUCKET, "AccessDenied"));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
