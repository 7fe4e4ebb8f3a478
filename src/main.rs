//! Scheduled MySQL Backup Tool
//!
//! Dumps every user database, gzips the dumps, uploads them to S3 and prunes old backups.

// dbdump/src/main.rs
mod backup;
mod config;
mod errors;
mod storage;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    match run_app().await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run_app() -> Result<ExitCode> {
    info!("Starting dbdump");
    let app_config = AppConfig::from_env().context("Failed to load configuration from environment")?;

    let choice = env::args()
        .nth(1)
        .map(|arg| arg.trim().to_string())
        .unwrap_or_else(|| "backup".to_string());

    match choice.as_str() {
        "1" | "backup" => {
            info!("🚀 Starting Backup Process...");
            let summary = backup::run_backup_flow(&app_config)
                .await
                .context("Backup process failed")?;
            info!(
                summary = %serde_json::to_string(&summary).context("Failed to serialize run summary")?,
                "Run summary"
            );

            if summary.has_failures() {
                warn!(
                    "⚠️ {} database(s) failed to back up; see errors above",
                    summary.failed_count()
                );
                if app_config.backup.fail_on_error {
                    return Ok(ExitCode::FAILURE);
                }
            } else {
                info!("🎉 Backup completed successfully");
            }
        }
        "2" | "prune" => {
            info!("🧹 Starting Retention Pass...");
            let report = backup::run_prune_flow(&app_config)
                .await
                .context("Retention process failed")?;
            info!(
                report = %serde_json::to_string(&report).context("Failed to serialize prune report")?,
                "Prune report"
            );
            if !report.failures.is_empty() && app_config.backup.fail_on_error {
                return Ok(ExitCode::FAILURE);
            }
        }
        other => {
            anyhow::bail!("Invalid operation {:?}. Use '1' (backup) or '2' (prune).", other);
        }
    }
    Ok(ExitCode::SUCCESS)
}
