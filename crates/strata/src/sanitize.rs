//! Identifier sanitising for migration names and SQL identifiers

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrateError, MigrateResult};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("identifier pattern is valid"));

/// Longest migration name (without timestamp) accepted by `create`
pub const MAX_MIGRATION_NAME_LEN: usize = 200;

/// Normalise a user supplied migration name into a safe identifier
///
/// Dashes and spaces become underscores, the result is lowercased, trimmed
/// of whitespace and surrounding underscores and capped at
/// [`MAX_MIGRATION_NAME_LEN`] characters. Anything left outside
/// `[a-zA-Z0-9_]` is rejected.
pub fn sanitize_migration_name(name: &str) -> MigrateResult<String> {
    let normalized = name.replace(['-', ' '], "_").to_lowercase();
    let mut normalized = normalized.trim().trim_matches('_').to_string();

    if let Some((idx, _)) = normalized.char_indices().nth(MAX_MIGRATION_NAME_LEN) {
        normalized.truncate(idx);
    }

    if !IDENTIFIER.is_match(&normalized) {
        return Err(MigrateError::InvalidMigrationName(normalized));
    }

    Ok(normalized)
}

/// Validate a table or schema identifier before it is spliced into SQL
pub fn sanitize_table_name(name: &str) -> MigrateResult<&str> {
    if !IDENTIFIER.is_match(name) {
        return Err(MigrateError::InvalidTableName(name.to_string()));
    }
    Ok(name)
}
