//! Migration file scaffolding
//!
//! Generates new, timestamp-prefixed migration files. The generated name is
//! baked into the file so the migration keeps its identity even if the file
//! is renamed later.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ScaffoldFormat;
use crate::error::{MigrateError, MigrateResult};
use crate::sanitize::sanitize_migration_name;

/// Timestamp layout prefixed to generated migration names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static TIMESTAMP_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{14})_").expect("timestamp pattern is valid"));

pub static RUST_MIGRATION_TEMPLATE: &str = r#"use strata::Migration;

pub struct {{struct_name}};

impl Migration for {{struct_name}} {
    fn name(&self) -> &str {
        // Don't change this name
        "{{migration_name}}"
    }

    fn up_script(&self) -> &str {
        // Write your migration SQL here
        ""
    }

    fn down_script(&self) -> &str {
        // Write your rollback SQL here
        ""
    }
}
"#;

pub static SQL_MIGRATION_TEMPLATE: &str = r#"-- Migration: {{migration_name}}
-- Created: {{created_at}}

-- Up migration


-- Down migration

"#;

fn render_template(template: &str, context: &HashMap<&str, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in context {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

/// Type name for a generated migration: `M` + timestamp + TitleCased words
///
/// `20240101120000_create_users` becomes `M20240101120000CreateUsers`.
pub fn migration_name_to_struct_name(migration_name: &str) -> MigrateResult<String> {
    let captures = TIMESTAMP_PREFIX
        .captures(migration_name)
        .ok_or_else(|| MigrateError::InvalidMigrationName(migration_name.to_string()))?;
    let timestamp = &captures[1];
    let rest = &migration_name[captures[0].len()..];

    let words: String = rest
        .split('_')
        .filter(|part| !part.is_empty())
        .map(title_case)
        .collect();

    Ok(format!("M{}{}", timestamp, words))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// File name (without directory) for a migration
///
/// Rust modules cannot start with a digit, so Rust scaffolds get an `m` prefix.
pub fn migration_file_name(migration_name: &str, format: ScaffoldFormat) -> String {
    match format {
        ScaffoldFormat::Rust => format!("m{}.rs", migration_name),
        ScaffoldFormat::Sql => format!("{}.sql", migration_name),
    }
}

/// Render the content of a new migration file
pub fn migration_file_template(
    migration_name: &str,
    format: ScaffoldFormat,
    created_at: DateTime<Utc>,
) -> MigrateResult<String> {
    let mut context = HashMap::new();
    context.insert("migration_name", migration_name.to_string());

    let template = match format {
        ScaffoldFormat::Rust => {
            context.insert("struct_name", migration_name_to_struct_name(migration_name)?);
            RUST_MIGRATION_TEMPLATE
        }
        ScaffoldFormat::Sql => {
            context.insert("created_at", created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
            SQL_MIGRATION_TEMPLATE
        }
    };

    Ok(render_template(template, &context))
}

/// Write a new migration file named after the current time
pub fn create_migration_file(dir: &Path, name: &str, format: ScaffoldFormat) -> MigrateResult<PathBuf> {
    create_migration_file_at(dir, name, format, Utc::now())
}

/// Write a new migration file using `now` for the timestamp prefix
pub fn create_migration_file_at(
    dir: &Path,
    name: &str,
    format: ScaffoldFormat,
    now: DateTime<Utc>,
) -> MigrateResult<PathBuf> {
    if name.is_empty() {
        return Err(MigrateError::MigrationNameMissing);
    }
    let sanitized = sanitize_migration_name(name)?;

    if !dir.is_dir() {
        return Err(MigrateError::MigrationDirMissing(dir.to_path_buf()));
    }

    let migration_name = format!("{}_{}", now.format(TIMESTAMP_FORMAT), sanitized);
    let path = dir.join(migration_file_name(&migration_name, format));
    if path.exists() {
        return Err(MigrateError::MigrationFileAlreadyExists(path));
    }

    let content = migration_file_template(&migration_name, format, now)?;
    fs::write(&path, content)?;

    tracing::info!(path = %path.display(), "migration file created");
    Ok(path)
}
