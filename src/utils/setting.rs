// Connectivity checks run before any database is dumped.
use sqlx::mysql::MySqlConnection;
use sqlx::Connection;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::errors::{ConfigError, ConnectivityError};

/// Opens a server-level connection, bounded by the configured connect timeout.
pub async fn connect(db: &DatabaseConfig) -> Result<MySqlConnection, ConnectivityError> {
    let url = db.server_url().map_err(|e: ConfigError| ConnectivityError::Database {
        addr: db.address(),
        error: sqlx::Error::Configuration(e.into()),
    })?;

    match timeout(db.connect_timeout, MySqlConnection::connect(url.as_str())).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(ConnectivityError::Database {
            addr: db.address(),
            error: e,
        }),
        Err(_) => Err(ConnectivityError::DatabaseTimeout {
            addr: db.address(),
            secs: db.connect_timeout.as_secs(),
        }),
    }
}

pub async fn check_db_connection(db: &DatabaseConfig) -> Result<(), ConnectivityError> {
    let result = async {
        let mut conn = connect(db).await?;
        sqlx::query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(|e| ConnectivityError::Database {
                addr: db.address(),
                error: e,
            })?;
        if let Err(e) = conn.close().await {
            debug!("Closing connection to {} failed: {}", db.address(), e);
        }
        Ok::<(), ConnectivityError>(())
    }
    .await;

    match &result {
        Ok(()) => info!("✅ Successfully connected to {}", db.address()),
        Err(e) => error!("❌ Failed to connect to {}: {}", db.address(), e),
    }
    result
}
