use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Missing or malformed settings. Always fatal, raised before any work starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {name} value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{name} executable not found in PATH: {error}")]
    Executable {
        name: &'static str,
        error: which::Error,
    },
}

/// The database server or the object store cannot be reached. Fatal.
#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("database server {addr} unreachable: {error}")]
    Database { addr: String, error: sqlx::Error },

    #[error("database server {addr} did not answer within {secs}s")]
    DatabaseTimeout { addr: String, secs: u64 },

    #[error("bucket {bucket} unreachable: {cause}")]
    Store { bucket: String, cause: String },
}

/// A failed dump of a single database. Recorded, then the run moves on.
#[derive(Error, Debug)]
#[error("dump of database {database} failed: {cause}")]
pub struct DumpError {
    pub database: String,
    pub cause: DumpCause,
}

#[derive(Error, Debug)]
pub enum DumpCause {
    #[error("failed to create dump file {}: {error}", .path.display())]
    CreateOutput { path: PathBuf, error: io::Error },

    #[error("failed to spawn mysqldump: {0}")]
    Spawn(io::Error),

    #[error("failed to stream dump into {}: {error}", .path.display())]
    Stream { path: PathBuf, error: io::Error },

    #[error("mysqldump exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },

    #[error("mysqldump did not finish within {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("error opening source file {}: {error}", .path.display())]
    Open { path: PathBuf, error: io::Error },

    #[error("error creating gzip file {}: {error}", .path.display())]
    Create { path: PathBuf, error: io::Error },

    #[error("error writing gzip file {}: {error}", .path.display())]
    Write { path: PathBuf, error: io::Error },

    #[error("error removing source file {}: {error}", .path.display())]
    RemoveSource { path: PathBuf, error: io::Error },
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unable to open file {}: {error}", .path.display())]
    Open { path: PathBuf, error: io::Error },

    #[error("unable to upload {key}: {cause}")]
    Transfer { key: String, cause: String },
}

#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("invalid DB_DUMP_FILE_KEEP_DAYS value {value:?}: {error}")]
    InvalidPolicy { value: String, error: ParseIntError },

    #[error("unable to list objects: {0}")]
    List(StoreError),
}

/// Failure reported by an object store backend for one call.
#[derive(Error, Debug, Clone)]
#[error("{operation} on bucket {bucket} failed: {message}")]
pub struct StoreError {
    pub operation: &'static str,
    pub bucket: String,
    pub message: String,
}

impl StoreError {
    pub fn new(operation: &'static str, bucket: &str, message: impl ToString) -> Self {
        Self {
            operation,
            bucket: bucket.to_string(),
            message: message.to_string(),
        }
    }
}
