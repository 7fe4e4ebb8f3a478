pub mod databases;
pub mod setting;

use std::path::PathBuf;
use which::which;

use crate::errors::ConfigError;

/// Finds the mysqldump executable in the system PATH.
pub fn find_mysqldump_executable() -> Result<PathBuf, ConfigError> {
    which("mysqldump").map_err(|error| ConfigError::Executable {
        name: "mysqldump",
        error,
    })
}
