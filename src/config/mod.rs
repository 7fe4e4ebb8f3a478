// dbdump/src/config/mod.rs
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::errors::ConfigError;

pub const DEFAULT_DB_PORT: u16 = 3306;
pub const DEFAULT_DUMP_PATH: &str = "./dumps";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DUMP_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_S3_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub dump_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Prepended to every object key; always ends with `/` when set.
    pub prefix: Option<String>,
    /// `None` means the default AWS provider chain.
    pub credentials: Option<StaticCredentials>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub dump_dir: PathBuf,
    pub gzip: bool,
    /// Raw keep-count; validated by the retention engine, not here.
    pub keep_count: Option<String>,
    /// Restricts the run to these databases when set.
    pub databases: Option<Vec<String>>,
    pub fail_on_error: bool,
}

/// Everything the process needs, resolved once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub backup: BackupConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database = DatabaseConfig {
            host: get("DB_HOST").ok_or(ConfigError::Missing("DB_HOST"))?,
            port: match get("DB_PORT") {
                Some(raw) => parse_number("DB_PORT", &raw)?,
                None => DEFAULT_DB_PORT,
            },
            user: get("DB_USER").ok_or(ConfigError::Missing("DB_USER"))?,
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            connect_timeout: timeout_from(&get, "DB_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
            dump_timeout: timeout_from(&get, "DB_DUMP_TIMEOUT_SECS", DEFAULT_DUMP_TIMEOUT_SECS)?,
        };
        database.server_url()?;

        let credentials = match (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
            }),
            _ => None,
        };

        let storage = StorageConfig {
            bucket: get("S3_BUCKET").ok_or(ConfigError::Missing("S3_BUCKET"))?,
            endpoint: get("S3_ENDPOINT"),
            region: get("AWS_REGION"),
            prefix: get("S3_PREFIX").map(normalize_prefix).filter(|p| !p.is_empty()),
            credentials,
            timeout: timeout_from(&get, "S3_TIMEOUT_SECS", DEFAULT_S3_TIMEOUT_SECS)?,
        };

        let backup = BackupConfig {
            dump_dir: get("DB_DUMP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DUMP_PATH)),
            gzip: lookup("DB_GZIP").as_deref() != Some("0"),
            keep_count: get("DB_DUMP_FILE_KEEP_DAYS"),
            databases: get("DATABASE_LIST").and_then(|raw| parse_database_list(&raw)),
            fail_on_error: get("DB_FAIL_ON_ERROR").is_some_and(|raw| is_truthy(&raw)),
        };

        Ok(AppConfig {
            database,
            storage,
            backup,
        })
    }
}

impl BackupConfig {
    /// The keep-count as configured. Unset reads as empty, which the retention engine rejects.
    pub fn raw_keep_count(&self) -> &str {
        self.keep_count.as_deref().unwrap_or("")
    }
}

impl DatabaseConfig {
    /// `host:port`, the form used in log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Server-level connection URL (no default schema), credentials percent-encoded.
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            name: "DB_HOST",
            value: self.host.clone(),
            reason,
        };
        let mut url = Url::parse(&format!("mysql://{}:{}/", self.host, self.port))
            .map_err(|e| invalid(e.to_string()))?;
        url.set_username(&self.user)
            .map_err(|_| invalid("host does not accept credentials".to_string()))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| invalid("host does not accept credentials".to_string()))?;
        }
        Ok(url)
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn timeout_from<G>(get: &G, name: &'static str, default_secs: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let secs = match get(name) {
        Some(raw) => parse_number(name, &raw)?,
        None => default_secs,
    };
    Ok(Duration::from_secs(secs))
}

fn normalize_prefix(raw: String) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Parses the comma separated DATABASE_LIST value. Blank entries are dropped.
fn parse_database_list(raw: &str) -> Option<Vec<String>> {
    let databases: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    (!databases.is_empty()).then_some(databases)
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
