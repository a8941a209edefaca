//! Driver contract between the migration engine and a database backend
//!
//! A driver owns everything database specific: the bookkeeping table, running
//! scripts and wiping the schema. The engine only decides *which* migrations
//! to hand over and in what order.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::{MigrateError, MigrateResult};
use crate::migration::{ExecutedMigration, Migration};

/// Default name of the bookkeeping table
pub const DEFAULT_MIGRATION_TABLE: &str = "migrations";

/// Which script of a migration is being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply the migration (run the up script)
    Up,
    /// Roll the migration back (run the down script)
    Down,
}

impl Direction {
    /// Script of `migration` that runs in this direction
    pub fn script<'a>(&self, migration: &'a dyn Migration) -> &'a str {
        match self {
            Direction::Up => migration.up_script(),
            Direction::Down => migration.down_script(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Receives per-migration progress notifications from a driver
///
/// For every migration of a batch the driver calls `on_running` first and
/// then exactly one of `on_success` or `on_failed`. After `on_failed` the
/// batch stops, so later migrations are never announced.
pub trait MigrationObserver: Send + Sync {
    fn on_running(&self, _migration: &dyn Migration, _direction: Direction) {}

    fn on_success(&self, _migration: &dyn Migration, _direction: Direction) {}

    fn on_failed(&self, _migration: &dyn Migration, _direction: Direction, _error: &MigrateError) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {}

/// Database backend used by the migration engine
#[async_trait]
pub trait Driver: Send + Sync {
    /// Set the name of the bookkeeping table
    ///
    /// The engine validates the identifier before calling this.
    fn set_migration_table_name(&mut self, name: &str);

    /// Create the bookkeeping table if it does not exist yet
    async fn create_migrations_table(&self) -> MigrateResult<()>;

    /// All bookkeeping rows ordered by name, descending when `reverse` is set
    async fn get_executed_migrations(&self, reverse: bool) -> MigrateResult<Vec<ExecutedMigration>>;

    /// Drop every user table of the target schema
    async fn clean_database(&self) -> MigrateResult<()>;

    /// Run the up script of each migration in order and record it
    ///
    /// Stops at the first failure and returns it with the migration name attached.
    async fn apply_migrations(
        &self,
        migrations: &[Arc<dyn Migration>],
        observer: &dyn MigrationObserver,
    ) -> MigrateResult<()>;

    /// Run the down script of each migration in order and remove its record
    ///
    /// Stops at the first failure and returns it with the migration name attached.
    async fn unapply_migrations(
        &self,
        migrations: &[Arc<dyn Migration>],
        observer: &dyn MigrationObserver,
    ) -> MigrateResult<()>;

    /// Release connection resources
    async fn close(&self) -> MigrateResult<()>;
}
