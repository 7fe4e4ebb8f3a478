// Schemas the server keeps for itself. Matched by prefix, so `sys_config` is excluded as well.
pub const SYSTEM_DATABASE_PREFIXES: &[&str] = &[
    "information_schema", "performance_schema", "mysql", "sys",
];

pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Picks the databases to dump from what the server reported.
///
/// System schemas are always dropped, even when listed in `allow_list`. Names the
/// allow list mentions that the server does not have are skipped.
pub fn select_databases(discovered: Vec<String>, allow_list: Option<&[String]>) -> Vec<String> {
    discovered
        .into_iter()
        .filter(|name| !name.trim().is_empty())
        .filter(|name| !is_system_database(name))
        .filter(|name| allow_list.is_none_or(|allowed| allowed.contains(name)))
        .collect()
}
