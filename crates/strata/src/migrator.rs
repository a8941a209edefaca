//! Migration engine
//!
//! Compares the registry (what should be applied) with the bookkeeping table
//! (what has been applied) and asks the driver to close the gap in either
//! direction.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{MigratorBuilder, MigratorConfig};
use crate::driver::{Direction, Driver, MigrationObserver};
use crate::error::{MigrateError, MigrateResult};
use crate::migration::{Migration, RegisteredMigration, RegisteredMigrationList};
use crate::registry::Registry;
use crate::scaffold::create_migration_file;

/// Result of running pending migrations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationRunResult {
    /// Names of the migrations that were applied, in order
    pub applied: Vec<String>,
    /// Number of registered migrations that were already applied
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Result of rolling migrations back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackResult {
    /// Names of the migrations that were rolled back, newest first
    pub rolled_back: Vec<String>,
    /// Executed migrations that were skipped because they are not registered
    pub skipped_unknown: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackResult {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back.len()
    }
}

/// Result of a reset: everything rolled back, then everything re-applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetResult {
    pub rollback: RollbackResult,
    pub migrate: MigrationRunResult,
}

/// Observer the engine hands to the driver
///
/// Logs progress and forwards every notification to the user's observer.
struct TracingObserver<'a> {
    debug_sql: bool,
    inner: Option<&'a dyn MigrationObserver>,
}

impl MigrationObserver for TracingObserver<'_> {
    fn on_running(&self, migration: &dyn Migration, direction: Direction) {
        match direction {
            Direction::Up => tracing::info!(migration = migration.name(), "applying migration"),
            Direction::Down => tracing::info!(migration = migration.name(), "rolling back migration"),
        }
        if self.debug_sql {
            tracing::info!(
                migration = migration.name(),
                direction = %direction,
                sql = direction.script(migration),
                "executing migration script"
            );
        }
        if let Some(inner) = self.inner {
            inner.on_running(migration, direction);
        }
    }

    fn on_success(&self, migration: &dyn Migration, direction: Direction) {
        match direction {
            Direction::Up => tracing::info!(migration = migration.name(), "migration applied"),
            Direction::Down => tracing::info!(migration = migration.name(), "migration rolled back"),
        }
        if let Some(inner) = self.inner {
            inner.on_success(migration, direction);
        }
    }

    fn on_failed(&self, migration: &dyn Migration, direction: Direction, error: &MigrateError) {
        tracing::error!(
            migration = migration.name(),
            direction = %direction,
            error = %error,
            "migration failed"
        );
        if let Some(inner) = self.inner {
            inner.on_failed(migration, direction, error);
        }
    }
}

/// Schema migration engine
///
/// Operations take `&self` but must not run concurrently against the same
/// database: the bookkeeping table is not locked.
pub struct Migrator {
    driver: Box<dyn Driver>,
    registry: Registry,
    config: MigratorConfig,
    observer: Option<Arc<dyn MigrationObserver>>,
}

impl Migrator {
    /// Create a migrator, validating the configuration first
    pub fn new(mut driver: Box<dyn Driver>, config: MigratorConfig) -> MigrateResult<Self> {
        let config = config.normalized();
        config.validate()?;
        driver.set_migration_table_name(&config.migration_table_name);

        Ok(Self {
            driver,
            registry: Registry::new(),
            config,
            observer: None,
        })
    }

    pub fn builder() -> MigratorBuilder {
        MigratorBuilder::new()
    }

    /// Also notify `observer` about every migration the driver runs
    pub fn with_observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register migrations; see [`Registry::register`]
    pub fn register<I>(&self, migrations: I) -> MigrateResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Migration>>,
    {
        self.registry.register(migrations)
    }

    /// Register a single migration value
    pub fn register_migration<M: Migration + 'static>(&self, migration: M) -> MigrateResult<()> {
        self.registry.register([Arc::new(migration) as Arc<dyn Migration>])
    }

    fn observer(&self) -> TracingObserver<'_> {
        TracingObserver {
            debug_sql: self.config.debug_sql,
            inner: self.observer.as_deref(),
        }
    }

    /// Apply every registered migration that has not been executed yet
    pub async fn migrate(&self) -> MigrateResult<MigrationRunResult> {
        let start_time = Instant::now();

        self.driver.create_migrations_table().await?;
        let executed: HashSet<String> = self
            .driver
            .get_executed_migrations(false)
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();

        let (done, pending): (Vec<_>, Vec<_>) = self
            .registry
            .sorted()
            .into_iter()
            .partition(|m| executed.contains(m.name()));

        if pending.is_empty() {
            tracing::info!("no pending migrations");
            return Ok(MigrationRunResult {
                applied: Vec::new(),
                skipped_count: done.len(),
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        self.driver.apply_migrations(&pending, &self.observer()).await?;

        let result = MigrationRunResult {
            applied: pending.iter().map(|m| m.name().to_string()).collect(),
            skipped_count: done.len(),
            execution_time_ms: start_time.elapsed().as_millis(),
        };
        tracing::info!(
            applied = result.applied_count(),
            elapsed_ms = result.execution_time_ms as u64,
            "migrations applied"
        );
        Ok(result)
    }

    /// Roll back the `step` most recently applied migrations
    ///
    /// `step` larger than the number of executed migrations rolls back all of
    /// them. Executed migrations missing from the registry are skipped.
    pub async fn rollback(&self, step: i64) -> MigrateResult<RollbackResult> {
        if step <= 0 {
            return Err(MigrateError::InvalidRollbackStep(step));
        }
        let start_time = Instant::now();

        let executed = self.driver.get_executed_migrations(true).await?;
        if executed.is_empty() {
            tracing::info!("no migrations to roll back");
            return Ok(RollbackResult::default());
        }

        let step = usize::try_from(step).unwrap_or(usize::MAX).min(executed.len());

        let mut to_unapply = Vec::with_capacity(step);
        let mut skipped_unknown = Vec::new();
        for record in executed.into_iter().take(step) {
            match self.registry.get(&record.name) {
                Some(migration) => to_unapply.push(migration),
                None => {
                    tracing::warn!(migration = %record.name, "executed migration is not registered, skipping");
                    skipped_unknown.push(record.name);
                }
            }
        }

        if to_unapply.is_empty() {
            tracing::info!("no registered migrations to roll back");
            return Ok(RollbackResult {
                skipped_unknown,
                execution_time_ms: start_time.elapsed().as_millis(),
                ..RollbackResult::default()
            });
        }

        self.driver.unapply_migrations(&to_unapply, &self.observer()).await?;

        let result = RollbackResult {
            rolled_back: to_unapply.iter().map(|m| m.name().to_string()).collect(),
            skipped_unknown,
            execution_time_ms: start_time.elapsed().as_millis(),
        };
        tracing::info!(rolled_back = result.rolled_back_count(), "rollback completed");
        Ok(result)
    }

    /// Roll back every executed migration, then apply everything again
    ///
    /// The two phases are not atomic: a failure while re-applying leaves the
    /// rollback in place.
    pub async fn reset(&self) -> MigrateResult<ResetResult> {
        self.driver
            .create_migrations_table()
            .await
            .map_err(|e| e.context("rollback failed during reset"))?;
        let executed = self
            .driver
            .get_executed_migrations(true)
            .await
            .map_err(|e| e.context("rollback failed during reset"))?;

        let rollback = if executed.is_empty() {
            RollbackResult::default()
        } else {
            let count = i64::try_from(executed.len()).unwrap_or(i64::MAX);
            self.rollback(count)
                .await
                .map_err(|e| e.context("rollback failed during reset"))?
        };

        let migrate = self
            .migrate()
            .await
            .map_err(|e| e.context("migration failed during reset"))?;

        Ok(ResetResult { rollback, migrate })
    }

    /// Drop every table, then apply all migrations
    pub async fn fresh(&self) -> MigrateResult<MigrationRunResult> {
        self.driver
            .clean_database()
            .await
            .map_err(|e| e.context("failed to clean database"))?;

        self.migrate()
            .await
            .map_err(|e| e.context("failed to run migrations after cleaning"))
    }

    /// Drop every table without re-applying anything
    pub async fn clean(&self) -> MigrateResult<()> {
        self.driver
            .clean_database()
            .await
            .map_err(|e| e.context("failed to clean database"))
    }

    /// Every registered migration with its execution status, sorted by name
    pub async fn list(&self) -> MigrateResult<RegisteredMigrationList> {
        self.driver.create_migrations_table().await?;
        let executed = self.driver.get_executed_migrations(false).await?;
        let executed_at: HashMap<_, _> = executed
            .into_iter()
            .map(|m| (m.name, m.executed_at))
            .collect();

        let list = self
            .registry
            .sorted()
            .into_iter()
            .map(|m| {
                let at = executed_at.get(m.name()).copied();
                RegisteredMigration {
                    name: m.name().to_string(),
                    up_script: m.up_script().to_string(),
                    down_script: m.down_script().to_string(),
                    is_executed: at.is_some(),
                    executed_at: at,
                }
            })
            .collect();

        Ok(RegisteredMigrationList(list))
    }

    /// Scaffold a new migration file in the configured directory
    pub fn create(&self, name: &str) -> MigrateResult<PathBuf> {
        create_migration_file(
            &self.config.migration_files_dir,
            name,
            self.config.scaffold_format,
        )
    }

    /// Release the driver's resources
    pub async fn close(&self) -> MigrateResult<()> {
        self.driver.close().await
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
