//! Plain SQL migrations
//!
//! Besides Rust types implementing [`Migration`], migrations can live in a
//! directory of `.sql` files. Each file holds both directions, separated by
//! marker comments:
//!
//! ```sql
//! -- Up migration
//! CREATE TABLE users (id SERIAL PRIMARY KEY);
//!
//! -- Down migration
//! DROP TABLE users;
//! ```
//!
//! The file stem is the migration name, so `20240101120000_create_users.sql`
//! becomes `20240101120000_create_users`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;

/// Migration defined by literal SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    up: String,
    down: String,
}

impl SqlMigration {
    pub fn new(name: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down: down.into(),
        }
    }

    /// Build a migration from the contents of a `.sql` file
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let (up, down) = split_sections(content);
        Self::new(name, up, down)
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up_script(&self) -> &str {
        &self.up
    }

    fn down_script(&self) -> &str {
        &self.down
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// A whole-line `-- Up` / `-- +down` / `-- Down migration` marker
static SECTION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^--\s*\+?(up|down)(\s+migration)?\s*$").expect("section marker pattern is valid")
});

fn section_marker(line: &str) -> Option<Section> {
    let captures = SECTION_MARKER.captures(line)?;
    if captures[1].eq_ignore_ascii_case("up") {
        Some(Section::Up)
    } else {
        Some(Section::Down)
    }
}

/// Split file content into its up and down SQL
fn split_sections(content: &str) -> (String, String) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut section = Section::Preamble;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(marker) = section_marker(trimmed) {
            section = marker;
            continue;
        }

        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        match section {
            Section::Up => up.push(line),
            Section::Down => down.push(line),
            Section::Preamble => {}
        }
    }

    (up.join("\n").trim().to_string(), down.join("\n").trim().to_string())
}

/// Load every `*.sql` file of `dir` as a migration, sorted by name
pub fn load_sql_migrations(dir: impl AsRef<Path>) -> MigrateResult<Vec<Arc<dyn Migration>>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(MigrateError::MigrationDirMissing(dir.to_path_buf()));
    }

    let mut migrations = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "sql") {
            continue;
        }

        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| MigrateError::InvalidMigrationName(path.display().to_string()))?
            .to_string();
        let content = fs::read_to_string(&path)?;

        tracing::debug!(migration = %name, path = %path.display(), "loaded sql migration");
        migrations.push(SqlMigration::parse(name, &content));
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(migrations
        .into_iter()
        .map(|m| Arc::new(m) as Arc<dyn Migration>)
        .collect())
}
