// dbdump/src/backup/naming.rs
//! Artifact keys: `<database>-<YYYYMMDDThhmmss>.sql[.gz]`.
//!
//! The key is both the local file name in the dump directory and the object key in the
//! bucket, so it is the join between the two during retention.

use chrono::{DateTime, Utc};

pub const KEY_SEPARATOR: char = '-';
pub const DUMP_SUFFIX: &str = ".sql";
pub const GZIP_SUFFIX: &str = ".gz";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Key of the raw dump for `db_name` captured at `captured_at`.
pub fn make_key(db_name: &str, captured_at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}{}",
        db_name,
        KEY_SEPARATOR,
        captured_at.format(TIMESTAMP_FORMAT),
        DUMP_SUFFIX
    )
}

/// Recovers the database name from a key by cutting at the first separator.
///
/// Keys without a separator come back whole, so objects this tool did not write still
/// land in a group of their own instead of failing the pass. A database whose name
/// contains the separator is grouped under its first segment.
pub fn recover_database_name(key: &str) -> &str {
    key.split_once(KEY_SEPARATOR)
        .map_or(key, |(name, _)| name)
}
