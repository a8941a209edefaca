//! In-memory driver for development and testing
//!
//! Keeps the bookkeeping rows in process and records every script it is asked
//! to run instead of executing SQL. Failures can be injected per migration so
//! the engine's fail-fast behaviour can be exercised without a database.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::driver::{Direction, Driver, MigrationObserver, DEFAULT_MIGRATION_TABLE};
use crate::error::{MigrateError, MigrateResult};
use crate::migration::{ExecutedMigration, Migration};

#[derive(Debug, Default)]
struct MemoryState {
    table_created: bool,
    executed: BTreeMap<String, ExecutedMigration>,
    scripts: Vec<String>,
    calls: HashMap<&'static str, usize>,
    fail_up: HashSet<String>,
    fail_down: HashSet<String>,
    closed: bool,
}

/// Driver that keeps all state in memory
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    table_name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            table_name: DEFAULT_MIGRATION_TABLE.to_string(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Make the up script of `name` fail
    pub fn fail_on_up(&self, name: &str) {
        self.state.lock().fail_up.insert(name.to_string());
    }

    /// Make the down script of `name` fail
    pub fn fail_on_down(&self, name: &str) {
        self.state.lock().fail_down.insert(name.to_string());
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_up.clear();
        state.fail_down.clear();
    }

    /// Pretend `name` was applied at `executed_at`, creating the table if needed
    pub fn seed_executed(&self, name: &str, executed_at: chrono::DateTime<Utc>) {
        let mut state = self.state.lock();
        state.table_created = true;
        state.executed.insert(
            name.to_string(),
            ExecutedMigration {
                name: name.to_string(),
                executed_at,
            },
        );
    }

    /// Names currently recorded as executed, ascending
    pub fn executed_names(&self) -> Vec<String> {
        self.state.lock().executed.keys().cloned().collect()
    }

    /// Every script run so far, in execution order
    pub fn executed_scripts(&self) -> Vec<String> {
        self.state.lock().scripts.clone()
    }

    /// Number of times the named driver operation was invoked
    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Total number of driver operations invoked
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn has_migrations_table(&self) -> bool {
        self.state.lock().table_created
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn track(&self, operation: &'static str) {
        *self.state.lock().calls.entry(operation).or_insert(0) += 1;
    }

    fn run_one(&self, migration: &dyn Migration, direction: Direction) -> MigrateResult<()> {
        let mut state = self.state.lock();
        if !state.table_created {
            return Err(MigrateError::storage(format!(
                "relation \"{}\" does not exist",
                self.table_name
            )));
        }

        let name = migration.name();
        let injected = match direction {
            Direction::Up => state.fail_up.contains(name),
            Direction::Down => state.fail_down.contains(name),
        };
        if injected {
            return Err(MigrateError::storage(format!("injected {} failure", direction)));
        }

        if direction == Direction::Up && state.executed.contains_key(name) {
            return Err(MigrateError::storage(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                self.table_name
            )));
        }

        let script = direction.script(migration);
        if !script.is_empty() {
            state.scripts.push(script.to_string());
        }

        match direction {
            Direction::Up => {
                state.executed.insert(
                    name.to_string(),
                    ExecutedMigration {
                        name: name.to_string(),
                        executed_at: Utc::now(),
                    },
                );
            }
            Direction::Down => {
                state.executed.remove(name);
            }
        }

        Ok(())
    }

    fn run_batch(
        &self,
        migrations: &[Arc<dyn Migration>],
        direction: Direction,
        observer: &dyn MigrationObserver,
    ) -> MigrateResult<()> {
        for migration in migrations {
            let migration = migration.as_ref();
            observer.on_running(migration, direction);

            if let Err(err) = self.run_one(migration, direction) {
                let err = err.for_migration(migration.name());
                observer.on_failed(migration, direction, &err);
                return Err(err);
            }

            observer.on_success(migration, direction);
        }
        Ok(())
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn set_migration_table_name(&mut self, name: &str) {
        self.table_name = if name.is_empty() {
            DEFAULT_MIGRATION_TABLE.to_string()
        } else {
            name.to_string()
        };
    }

    async fn create_migrations_table(&self) -> MigrateResult<()> {
        self.track("create_migrations_table");
        self.state.lock().table_created = true;
        Ok(())
    }

    async fn get_executed_migrations(&self, reverse: bool) -> MigrateResult<Vec<ExecutedMigration>> {
        self.track("get_executed_migrations");
        let state = self.state.lock();
        if !state.table_created {
            return Err(MigrateError::storage(format!(
                "relation \"{}\" does not exist",
                self.table_name
            )));
        }

        let mut executed: Vec<ExecutedMigration> = state.executed.values().cloned().collect();
        if reverse {
            executed.reverse();
        }
        Ok(executed)
    }

    async fn clean_database(&self) -> MigrateResult<()> {
        self.track("clean_database");
        let mut state = self.state.lock();
        state.table_created = false;
        state.executed.clear();
        Ok(())
    }

    async fn apply_migrations(
        &self,
        migrations: &[Arc<dyn Migration>],
        observer: &dyn MigrationObserver,
    ) -> MigrateResult<()> {
        self.track("apply_migrations");
        self.run_batch(migrations, Direction::Up, observer)
    }

    async fn unapply_migrations(
        &self,
        migrations: &[Arc<dyn Migration>],
        observer: &dyn MigrationObserver,
    ) -> MigrateResult<()> {
        self.track("unapply_migrations");
        self.run_batch(migrations, Direction::Down, observer)
    }

    async fn close(&self) -> MigrateResult<()> {
        self.track("close");
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NoopObserver;
    use crate::source::SqlMigration;

    fn migration(name: &str) -> Arc<dyn Migration> {
        Arc::new(SqlMigration::new(
            name,
            format!("CREATE TABLE {} (id INT);", name),
            format!("DROP TABLE {};", name),
        ))
    }

    #[tokio::test]
    async fn test_executed_order() {
        let driver = MemoryDriver::new();
        driver.create_migrations_table().await.unwrap();
        driver
            .apply_migrations(&[migration("b"), migration("a")], &NoopObserver)
            .await
            .unwrap();

        let asc: Vec<_> = driver
            .get_executed_migrations(false)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        let desc: Vec<_> = driver
            .get_executed_migrations(true)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();

        assert_eq!(asc, vec!["a", "b"]);
        assert_eq!(desc, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error() {
        let driver = MemoryDriver::new();
        let err = driver.get_executed_migrations(false).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_clean_tolerates_empty_database() {
        let driver = MemoryDriver::new();
        driver.clean_database().await.unwrap();
        driver.clean_database().await.unwrap();
        assert_eq!(driver.calls("clean_database"), 2);
    }

    #[tokio::test]
    async fn test_unapply_removes_record() {
        let driver = MemoryDriver::new();
        driver.create_migrations_table().await.unwrap();
        driver.apply_migrations(&[migration("a")], &NoopObserver).await.unwrap();
        driver.unapply_migrations(&[migration("a")], &NoopObserver).await.unwrap();

        assert!(driver.executed_names().is_empty());
        assert_eq!(
            driver.executed_scripts(),
            vec!["CREATE TABLE a (id INT);", "DROP TABLE a;"]
        );
    }

    #[tokio::test]
    async fn test_failure_carries_migration_name() {
        let driver = MemoryDriver::new();
        driver.create_migrations_table().await.unwrap();
        driver.fail_on_up("b");

        let err = driver
            .apply_migrations(&[migration("a"), migration("b")], &NoopObserver)
            .await
            .unwrap_err();

        assert_eq!(err.migration(), Some("b"));
        assert_eq!(driver.executed_names(), vec!["a"]);
    }
}
