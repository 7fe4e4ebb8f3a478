// dbdump/src/backup/db_dump.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Connection;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::process::{ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backup::naming::make_key;
use crate::config::DatabaseConfig;
use crate::errors::{ConnectivityError, DumpCause, DumpError};
use crate::utils::databases::select_databases;
use crate::utils::setting::connect;

/// Produces the raw dump artifact for one database.
#[async_trait]
pub trait ArtifactProducer: Send + Sync {
    /// Writes `<dump_dir>/<key>` and returns its path.
    async fn produce(
        &self,
        db_name: &str,
        dump_dir: &Path,
        captured_at: DateTime<Utc>,
    ) -> Result<PathBuf, DumpError>;
}

/// Runs `mysqldump` against the configured server.
pub struct Dumper {
    executable: PathBuf,
    db: DatabaseConfig,
}

impl Dumper {
    pub fn new(executable: PathBuf, db: DatabaseConfig) -> Self {
        Dumper { executable, db }
    }

    fn dump_args(&self, db_name: &str) -> Vec<String> {
        vec![
            format!("--host={}", self.db.host),
            format!("--port={}", self.db.port),
            format!("--user={}", self.db.user),
            "--protocol=TCP".to_string(),
            "--single-transaction".to_string(),
            "--quick".to_string(),
            "--routines".to_string(),
            "--triggers".to_string(),
            "--events".to_string(),
            "--databases".to_string(),
            db_name.to_string(),
        ]
    }

    async fn run(&self, db_name: &str, dump_path: &Path) -> Result<u64, DumpCause> {
        let file = File::create(dump_path)
            .await
            .map_err(|error| DumpCause::CreateOutput {
                path: dump_path.to_path_buf(),
                error,
            })?;

        // The password goes through the environment so it never shows up in `ps`.
        let mut child = Command::new(&self.executable)
            .args(self.dump_args(db_name))
            .env("MYSQL_PWD", &self.db.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DumpCause::Spawn)?;

        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(DumpCause::Spawn(std::io::Error::other(
                "mysqldump pipes were not captured",
            )));
        };

        let stderr_task = tokio::spawn(async move {
            let mut captured = Vec::new();
            stderr.read_to_end(&mut captured).await.map(|_| captured)
        });

        let streaming = async {
            let bytes = match write_stream(stdout, file).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    // stdout is closed by now; stop mysqldump instead of letting it block.
                    if let Err(e) = child.start_kill() {
                        debug!("mysqldump already exited: {}", e);
                    }
                    if let Err(e) = child.wait().await {
                        debug!("Could not reap mysqldump: {}", e);
                    }
                    return Err(DumpCause::Stream {
                        path: dump_path.to_path_buf(),
                        error,
                    });
                }
            };

            let status = child.wait().await.map_err(DumpCause::Spawn)?;
            if !status.success() {
                return Err(DumpCause::Exit {
                    status,
                    stderr: collect_stderr(stderr_task).await,
                });
            }
            Ok::<u64, DumpCause>(bytes)
        };

        match timeout(self.db.dump_timeout, streaming).await {
            Ok(result) => result,
            Err(_) => Err(DumpCause::Timeout(self.db.dump_timeout.as_secs())),
        }
    }
}

/// Copies the dump stream to disk and syncs it. The pipe is dropped on return.
async fn write_stream(mut stdout: ChildStdout, file: File) -> std::io::Result<u64> {
    let mut writer = BufWriter::new(file);
    let bytes = tokio::io::copy(&mut stdout, &mut writer).await?;
    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    Ok(bytes)
}

async fn collect_stderr(task: JoinHandle<std::io::Result<Vec<u8>>>) -> String {
    match task.await {
        Ok(Ok(captured)) => String::from_utf8_lossy(&captured).trim().to_string(),
        Ok(Err(e)) => {
            warn!("Could not read mysqldump stderr: {}", e);
            String::new()
        }
        Err(e) => {
            warn!("mysqldump stderr reader failed: {}", e);
            String::new()
        }
    }
}

#[async_trait]
impl ArtifactProducer for Dumper {
    async fn produce(
        &self,
        db_name: &str,
        dump_dir: &Path,
        captured_at: DateTime<Utc>,
    ) -> Result<PathBuf, DumpError> {
        let dump_path = dump_dir.join(make_key(db_name, captured_at));
        info!("🔍 Dumping database {} to {}", db_name, dump_path.display());

        match self.run(db_name, &dump_path).await {
            Ok(bytes) => {
                info!("✓ Dumped {} ({} bytes)", db_name, bytes);
                Ok(dump_path)
            }
            Err(cause) => {
                // A truncated dump must never be mistaken for a good one on the next run.
                if let Err(e) = tokio::fs::remove_file(&dump_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not remove partial dump {}: {}", dump_path.display(), e);
                    }
                }
                Err(DumpError {
                    database: db_name.to_string(),
                    cause,
                })
            }
        }
    }
}

/// Lists the databases to back up: everything the server reports minus system schemas,
/// narrowed to `allow_list` when one is configured.
pub async fn list_databases(
    db: &DatabaseConfig,
    allow_list: Option<&[String]>,
) -> Result<Vec<String>, ConnectivityError> {
    let mut conn = connect(db).await?;
    // CAST keeps the column a character type across server versions.
    let discovered: Vec<String> = sqlx::query_scalar(
        "SELECT CAST(SCHEMA_NAME AS CHAR) FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME",
    )
    .fetch_all(&mut conn)
    .await
    .map_err(|error| ConnectivityError::Database {
        addr: db.address(),
        error,
    })?;
    if let Err(e) = conn.close().await {
        debug!("Closing connection to {} failed: {}", db.address(), e);
    }

    debug!("Server reported databases: {:?}", discovered);
    Ok(select_databases(discovered, allow_list))
}
