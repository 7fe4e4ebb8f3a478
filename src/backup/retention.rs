// dbdump/src/backup/retention.rs
//! Keep-newest-N pruning of uploaded artifacts, per database.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::backup::naming::recover_database_name;
use crate::errors::RetentionError;
use crate::storage::{ObjectStore, RemoteObject};

/// Number of most recent artifacts kept for every database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    pub keep: usize,
}

impl FromStr for RetentionPolicy {
    type Err = RetentionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.trim()
            .parse::<usize>()
            .map(|keep| RetentionPolicy { keep })
            .map_err(|error| RetentionError::InvalidPolicy {
                value: raw.to_string(),
                error,
            })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub retained: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    pub cause: String,
}

#[derive(Debug, Default, Serialize)]
pub struct PruneReport {
    pub groups: BTreeMap<String, GroupReport>,
    pub failures: Vec<DeleteFailure>,
    pub local_removed: usize,
}

impl PruneReport {
    pub fn total_deleted(&self) -> usize {
        self.groups.values().map(|g| g.deleted).sum()
    }

    pub fn total_retained(&self) -> usize {
        self.groups.values().map(|g| g.retained).sum()
    }
}

/// Validates `keep_count`, then prunes the bucket and the local dump directory.
///
/// An unparseable keep-count fails before the store is contacted.
pub async fn prune(
    store: &dyn ObjectStore,
    dump_dir: &Path,
    keep_count: &str,
) -> Result<PruneReport, RetentionError> {
    let policy: RetentionPolicy = keep_count.parse()?;
    apply_policy(store, dump_dir, policy).await
}

pub async fn apply_policy(
    store: &dyn ObjectStore,
    dump_dir: &Path,
    policy: RetentionPolicy,
) -> Result<PruneReport, RetentionError> {
    info!(
        "🧹 Keeping the newest {} backup(s) per database in bucket {}",
        policy.keep,
        store.bucket()
    );

    let objects = store.list_objects().await.map_err(RetentionError::List)?;
    let mut report = PruneReport::default();

    for (database, group) in group_by_database(objects) {
        let keep = policy.keep.min(group.len());
        let (retained, expired) = group.split_at(keep);
        let entry = report.groups.entry(database).or_default();
        entry.retained = retained.len();

        for object in expired {
            match store.delete_object(&object.key).await {
                Ok(()) => {
                    info!("🗑 Deleted {} from bucket {}", object.key, store.bucket());
                    entry.deleted += 1;
                    if remove_local_copy(dump_dir, &object.key).await {
                        report.local_removed += 1;
                    }
                }
                Err(e) => {
                    warn!("⚠️ Failed to delete {}: {}", object.key, e);
                    report.failures.push(DeleteFailure {
                        key: object.key.clone(),
                        cause: e.to_string(),
                    });
                }
            }
        }
    }

    info!(
        "✅ Retention pass finished: {} retained, {} deleted, {} failed",
        report.total_retained(),
        report.total_deleted(),
        report.failures.len()
    );
    Ok(report)
}

/// Groups objects by recovered database name, each group newest first.
pub fn group_by_database(objects: Vec<RemoteObject>) -> BTreeMap<String, Vec<RemoteObject>> {
    let mut groups: BTreeMap<String, Vec<RemoteObject>> = BTreeMap::new();
    for object in objects {
        let name = recover_database_name(file_name(&object.key)).to_string();
        groups.entry(name).or_default().push(object);
    }
    for group in groups.values_mut() {
        group.sort_by(newest_first);
    }
    groups
}

/// Descending by last-modified; equal instants fall back to descending key order, which
/// for keys made by `make_key` is descending capture time.
fn newest_first(a: &RemoteObject, b: &RemoteObject) -> Ordering {
    b.last_modified
        .cmp(&a.last_modified)
        .then_with(|| b.key.cmp(&a.key))
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Best effort. Returns whether a local file was removed.
async fn remove_local_copy(dump_dir: &Path, key: &str) -> bool {
    let local = dump_dir.join(file_name(key));
    match tokio::fs::remove_file(&local).await {
        Ok(()) => {
            info!("🗑 Deleted local copy {}", local.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("⚠️ Failed to delete local copy {}: {}", local.display(), e);
            false
        }
    }
}
