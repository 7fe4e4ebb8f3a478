mod logic;
pub(crate) mod archive;
pub(crate) mod db_dump;
pub(crate) mod naming;
pub(crate) mod retention;
pub(crate) mod s3_upload;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
use crate::storage::{ObjectStore, S3Store};
use crate::utils::find_mysqldump_executable;
use crate::utils::setting::check_db_connection;
use db_dump::{Dumper, list_databases};
use retention::{PruneReport, RetentionPolicy};

pub use logic::RunSummary;

/// Public entry point for the backup process.
///
/// Misconfiguration and infrastructure problems (bad keep-count, missing mysqldump,
/// unreachable server or bucket, failed enumeration) abort here. Per-database problems
/// are carried in the returned summary.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<RunSummary> {
    let backup_config = &app_config.backup;
    info!("🛠 Using dump directory: {}", backup_config.dump_dir.display());
    logic::ensure_dir_is_usable(&backup_config.dump_dir)?;

    let policy: RetentionPolicy = backup_config
        .raw_keep_count()
        .parse()
        .context("Refusing to back up without a valid retention policy")?;

    let mysqldump = find_mysqldump_executable()?;
    info!("Found mysqldump executable at: {}", mysqldump.display());

    check_db_connection(&app_config.database)
        .await
        .context("Cannot proceed with backup - database connection failed")?;

    let store = S3Store::from_config(&app_config.storage).await;
    check_store(&store).await?;

    let databases = list_databases(&app_config.database, backup_config.databases.as_deref())
        .await
        .context("Failed to enumerate databases")?;
    if databases.is_empty() {
        anyhow::bail!("No databases found or specified to back up.");
    }

    let dumper = Dumper::new(mysqldump, app_config.database.clone());
    logic::perform_backup_orchestration(backup_config, policy, &dumper, &store, &databases).await
}

/// Runs only the retention pass against the bucket and the dump directory.
pub async fn run_prune_flow(app_config: &AppConfig) -> Result<PruneReport> {
    let store = S3Store::from_config(&app_config.storage).await;
    check_store(&store).await?;

    retention::prune(
        &store,
        &app_config.backup.dump_dir,
        app_config.backup.raw_keep_count(),
    )
        .await
        .context("Retention pass failed")
}

async fn check_store(store: &dyn ObjectStore) -> Result<()> {
    store
        .check()
        .await
        .map_err(|e| crate::errors::ConnectivityError::Store {
            bucket: store.bucket().to_string(),
            cause: e.to_string(),
        })
        .context("Cannot proceed - object store is unreachable")
}
