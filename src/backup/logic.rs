// dbdump/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::backup::archive::gzip_file;
use crate::backup::db_dump::ArtifactProducer;
use crate::backup::retention::{self, PruneReport, RetentionPolicy};
use crate::backup::s3_upload::upload_artifact;
use crate::config::BackupConfig;
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dump,
    Compress,
    Upload,
}

/// What happened to one database during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatabaseOutcome {
    Uploaded { database: String, key: String },
    Failed { database: String, stage: Stage, error: String },
}

impl DatabaseOutcome {
    fn failed(database: &str, stage: Stage, error: impl ToString) -> Self {
        DatabaseOutcome::Failed {
            database: database.to_string(),
            stage,
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub databases: Vec<DatabaseOutcome>,
    pub retention: PruneReport,
}

impl RunSummary {
    pub fn failed_count(&self) -> usize {
        self.databases
            .iter()
            .filter(|o| matches!(o, DatabaseOutcome::Failed { .. }))
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0 || !self.retention.failures.is_empty()
    }
}

/// Runs produce → compress → upload for every database, then one retention pass.
///
/// A failure in any stage is recorded against that database and the loop moves on.
/// Only a failed listing during retention aborts the run.
pub async fn perform_backup_orchestration(
    backup_config: &BackupConfig,
    policy: RetentionPolicy,
    producer: &dyn ArtifactProducer,
    store: &dyn ObjectStore,
    databases: &[String],
) -> Result<RunSummary> {
    let started_at = Utc::now();
    tokio::fs::create_dir_all(&backup_config.dump_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create dump directory: {}",
                backup_config.dump_dir.display()
            )
        })?;

    info!("Databases to be backed up: {:?}", databases);
    let mut outcomes = Vec::with_capacity(databases.len());
    for db_name in databases {
        let outcome = back_up_database(backup_config, producer, store, db_name).await;
        if let DatabaseOutcome::Failed { stage, error, .. } = &outcome {
            error!("❌ Backup of {} failed at {:?}: {}", db_name, stage, error);
        }
        outcomes.push(outcome);
    }

    let retention = retention::apply_policy(store, &backup_config.dump_dir, policy)
        .await
        .context("Retention pass failed")?;

    let summary = RunSummary {
        started_at,
        databases: outcomes,
        retention,
    };
    info!(
        "Backed up {} of {} database(s)",
        databases.len() - summary.failed_count(),
        databases.len()
    );
    Ok(summary)
}

async fn back_up_database(
    backup_config: &BackupConfig,
    producer: &dyn ArtifactProducer,
    store: &dyn ObjectStore,
    db_name: &str,
) -> DatabaseOutcome {
    let dump_path = match producer
        .produce(db_name, &backup_config.dump_dir, Utc::now())
        .await
    {
        Ok(path) => path,
        Err(e) => return DatabaseOutcome::failed(db_name, Stage::Dump, e),
    };

    let artifact = if backup_config.gzip {
        match compress(dump_path).await {
            Ok(path) => path,
            Err(e) => return DatabaseOutcome::failed(db_name, Stage::Compress, format!("{:#}", e)),
        }
    } else {
        dump_path
    };

    match upload_artifact(store, &artifact).await {
        Ok(key) => DatabaseOutcome::Uploaded {
            database: db_name.to_string(),
            key,
        },
        Err(e) => DatabaseOutcome::failed(db_name, Stage::Upload, e),
    }
}

/// Gzip is blocking file I/O, so it runs off the async workers.
async fn compress(dump_path: PathBuf) -> Result<PathBuf> {
    let display = dump_path.display().to_string();
    let compressed = tokio::task::spawn_blocking(move || gzip_file(&dump_path))
        .await
        .with_context(|| format!("Compression task for {} panicked", display))??;
    Ok(compressed)
}

pub fn ensure_dir_is_usable(dump_dir: &Path) -> Result<()> {
    if dump_dir.exists() && !dump_dir.is_dir() {
        anyhow::bail!("Dump path {} exists but is not a directory", dump_dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::naming::make_key;
    use crate::errors::{DumpCause, DumpError};
    use crate::storage::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use flate2::read::GzDecoder;
    use std::io::Read;

    /// Writes a small SQL file per database; names listed in `broken` fail.
    struct FakeProducer {
        broken: Vec<&'static str>,
    }

    #[async_trait]
    impl ArtifactProducer for FakeProducer {
        async fn produce(
            &self,
            db_name: &str,
            dump_dir: &Path,
            captured_at: DateTime<Utc>,
        ) -> Result<PathBuf, DumpError> {
            if self.broken.contains(&db_name) {
                return Err(DumpError {
                    database: db_name.to_string(),
                    cause: DumpCause::Timeout(1),
                });
            }
            let path = dump_dir.join(make_key(db_name, captured_at));
            std::fs::write(&path, format!("-- dump of {}\n", db_name)).unwrap();
            Ok(path)
        }
    }

    const KEEP_ALL: RetentionPolicy = RetentionPolicy { keep: 10 };

    fn backup_config(dump_dir: &Path, gzip: bool) -> BackupConfig {
        BackupConfig {
            dump_dir: dump_dir.to_path_buf(),
            gzip,
            keep_count: None,
            databases: None,
            fail_on_error: false,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_every_database_is_uploaded_compressed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = backup_config(dir.path(), true);
        let store = MemoryStore::default();
        let producer = FakeProducer { broken: vec![] };

        let summary =
            perform_backup_orchestration(&config, KEEP_ALL, &producer, &store, &names(&["shop", "crm"])).await?;

        assert!(!summary.has_failures());
        assert_eq!(summary.retention.total_retained(), 2);
        assert_eq!(summary.retention.total_deleted(), 0);
        let keys = store.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.ends_with(".sql.gz")));

        let crm_key = keys.iter().find(|k| k.starts_with("crm-")).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(store.contents(crm_key).unwrap().as_slice()).read_to_string(&mut decoded)?;
        assert_eq!(decoded, "-- dump of crm\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_gzip_disabled_uploads_raw_dump() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = backup_config(dir.path(), false);
        let store = MemoryStore::default();
        let producer = FakeProducer { broken: vec![] };

        perform_backup_orchestration(&config, KEEP_ALL, &producer, &store, &names(&["shop"])).await?;

        let keys = store.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("shop-") && keys[0].ends_with(".sql"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_dump_does_not_block_other_databases() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = backup_config(dir.path(), true);
        let store = MemoryStore::default();
        let producer = FakeProducer { broken: vec!["crm"] };

        let summary = perform_backup_orchestration(
            &config,
            KEEP_ALL,
            &producer,
            &store,
            &names(&["shop", "crm", "billing"]),
        )
        .await?;

        assert_eq!(summary.failed_count(), 1);
        assert!(summary.has_failures());
        assert!(matches!(
            &summary.databases[1],
            DatabaseOutcome::Failed { database, stage: Stage::Dump, .. } if database == "crm"
        ));
        assert!(matches!(&summary.databases[2], DatabaseOutcome::Uploaded { database, .. } if database == "billing"));
        assert_eq!(store.keys().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_failures_are_recorded_per_database() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = backup_config(dir.path(), true);
        let store = MemoryStore::default().rejecting_puts();
        let producer = FakeProducer { broken: vec![] };

        let summary =
            perform_backup_orchestration(&config, KEEP_ALL, &producer, &store, &names(&["shop", "crm"])).await?;

        assert_eq!(summary.failed_count(), 2);
        assert!(summary.databases.iter().all(|o| matches!(
            o,
            DatabaseOutcome::Failed { stage: Stage::Upload, .. }
        )));
        Ok(())
    }

    #[tokio::test]
    async fn test_retention_runs_once_after_all_uploads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = backup_config(dir.path(), true);
        let old = Utc::now() - Duration::days(2);
        let store = MemoryStore::with_objects([
            ("shop-20200101T000000.sql.gz", old),
            ("crm-20200101T000000.sql.gz", old),
        ]);
        let producer = FakeProducer { broken: vec![] };

        let summary = perform_backup_orchestration(
            &config,
            RetentionPolicy { keep: 1 },
            &producer,
            &store,
            &names(&["shop", "crm"]),
        )
        .await?;

        assert_eq!(store.list_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(summary.retention.total_deleted(), 2);
        assert!(store.keys().iter().all(|k| !k.contains("20200101")));
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_after_uploads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = backup_config(dir.path(), true);
        let store = MemoryStore::default().unreachable();
        let producer = FakeProducer { broken: vec![] };

        let err = perform_backup_orchestration(&config, KEEP_ALL, &producer, &store, &names(&["shop"]))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Retention pass failed"));
        Ok(())
    }

    #[test]
    fn test_summary_serializes_with_status_tags() -> anyhow::Result<()> {
        let summary = RunSummary {
            started_at: Utc::now(),
            databases: vec![
                DatabaseOutcome::Uploaded {
                    database: "shop".into(),
                    key: "shop-20230101T000000.sql.gz".into(),
                },
                DatabaseOutcome::failed("crm", Stage::Compress, "disk full"),
            ],
            retention: PruneReport::default(),
        };
        let json = serde_json::to_value(&summary)?;
        assert_eq!(json["databases"][0]["status"], "uploaded");
        assert_eq!(json["databases"][1]["stage"], "compress");
        assert_eq!(json["databases"][1]["error"], "disk full");
        Ok(())
    }

    #[test]
    fn test_dump_path_must_be_a_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("dumps");
        std::fs::write(&file, b"")?;
        assert!(ensure_dir_is_usable(&file).is_err());
        assert!(ensure_dir_is_usable(dir.path()).is_ok());
        assert!(ensure_dir_is_usable(&dir.path().join("not-yet")).is_ok());
        Ok(())
    }
}
