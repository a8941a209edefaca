//! Migration Definitions - Core types shared by the engine and the drivers
//!
//! Defines the [`Migration`] contract implemented by application code, the
//! bookkeeping record a driver reads back, and the status projection
//! produced by `Migrator::list`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// A named, reversible schema change
///
/// Implementations are usually unit structs generated by `Migrator::create`.
/// The name must be unique and is the only thing that orders migrations:
/// they run in lexicographic order of their names, which is why generated
/// names start with a `YYYYMMDDHHMMSS_` timestamp.
pub trait Migration: Send + Sync {
    /// Unique identifier, stored in the bookkeeping table
    fn name(&self) -> &str;

    /// SQL executed when the migration is applied
    fn up_script(&self) -> &str;

    /// SQL executed when the migration is rolled back
    fn down_script(&self) -> &str;
}

/// Row of the bookkeeping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedMigration {
    /// Migration name
    pub name: String,
    /// When the migration was applied
    pub executed_at: DateTime<Utc>,
}

/// A registered migration together with its execution status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredMigration {
    pub name: String,
    pub up_script: String,
    pub down_script: String,
    pub is_executed: bool,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Status of every registered migration, sorted by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisteredMigrationList(pub Vec<RegisteredMigration>);

impl RegisteredMigrationList {
    /// Migrations that have not been applied yet
    pub fn pending(&self) -> impl Iterator<Item = &RegisteredMigration> {
        self.0.iter().filter(|m| !m.is_executed)
    }

    /// Print the list as a table on stdout
    pub fn print(&self) {
        print!("{}", self);
    }

    fn rows(&self) -> Vec<[String; 3]> {
        let mut rows = Vec::with_capacity(self.0.len() + 1);
        rows.push([
            "Migration Name".to_string(),
            "Is Executed".to_string(),
            "Executed At".to_string(),
        ]);

        for migration in &self.0 {
            let executed_at = migration
                .executed_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "N/A".to_string());
            rows.push([
                migration.name.clone(),
                migration.is_executed.to_string(),
                executed_at,
            ]);
        }

        rows
    }
}

impl Deref for RegisteredMigrationList {
    type Target = [RegisteredMigration];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for RegisteredMigrationList {
    type Item = RegisteredMigration;
    type IntoIter = std::vec::IntoIter<RegisteredMigration>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for RegisteredMigrationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.rows();
        let mut widths = [0usize; 3];
        for row in &rows {
            for (i, col) in row.iter().enumerate() {
                widths[i] = widths[i].max(col.chars().count());
            }
        }

        let separator = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            write!(f, "+")?;
            for width in widths {
                write!(f, "{}+", "-".repeat(width + 2))?;
            }
            writeln!(f)
        };
        let line = |f: &mut fmt::Formatter<'_>, row: &[String; 3]| -> fmt::Result {
            write!(f, "|")?;
            for (col, width) in row.iter().zip(widths) {
                write!(f, " {:<width$} |", col, width = width)?;
            }
            writeln!(f)
        };

        separator(f)?;
        line(f, &rows[0])?;
        separator(f)?;
        for row in &rows[1..] {
            line(f, row)?;
        }
        separator(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, executed_at: Option<DateTime<Utc>>) -> RegisteredMigration {
        RegisteredMigration {
            name: name.to_string(),
            up_script: String::new(),
            down_script: String::new(),
            is_executed: executed_at.is_some(),
            executed_at,
        }
    }

    #[test]
    fn test_table_rendering() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let list = RegisteredMigrationList(vec![
            entry("001_create_users", Some(at)),
            entry("002_add_email", None),
        ]);

        let rendered = list.to_string();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("+-"));
        assert!(lines[1].contains("Migration Name"));
        assert!(lines[3].contains("001_create_users"));
        assert!(lines[3].contains("2024-01-01T12:00:00+00:00"));
        assert!(lines[4].contains("false"));
        assert!(lines[4].contains("N/A"));
        // every line has the same width
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
    }

    #[test]
    fn test_pending_filter() {
        let list = RegisteredMigrationList(vec![
            entry("a", Some(Utc::now())),
            entry("b", None),
        ]);

        let pending: Vec<_> = list.pending().map(|m| m.name.as_str()).collect();
        assert_eq!(pending, vec!["b"]);
    }

    #[test]
    fn test_executed_migration_serialization() {
        let record = ExecutedMigration {
            name: "001_init".to_string(),
            executed_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "001_init");
        assert_eq!(json["executed_at"], "2024-05-01T00:00:00Z");
    }
}
