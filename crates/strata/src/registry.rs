//! Registry of known migrations, keyed by name

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;

/// Name → migration map shared by every engine operation
///
/// Backed by a `BTreeMap`, so every read is already sorted by name. The
/// mutex makes registration from several initialisation threads safe; it
/// does not make concurrent `migrate`/`rollback` calls safe.
#[derive(Default)]
pub struct Registry {
    migrations: Mutex<BTreeMap<String, Arc<dyn Migration>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register migrations, rejecting empty and duplicate names
    ///
    /// The call is not all-or-nothing: when the third migration of a call is a
    /// duplicate, the first two stay registered and the error is returned.
    pub fn register<I>(&self, migrations: I) -> MigrateResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Migration>>,
    {
        let mut registered = self.migrations.lock();

        for migration in migrations {
            let name = migration.name().to_string();
            if name.is_empty() {
                return Err(MigrateError::MigrationNameMissing);
            }
            if registered.contains_key(&name) {
                return Err(MigrateError::DuplicateMigrationName(name));
            }
            tracing::debug!(migration = %name, "registered migration");
            registered.insert(name, migration);
        }

        Ok(())
    }

    /// All migrations, ordered by name
    pub fn sorted(&self) -> Vec<Arc<dyn Migration>> {
        self.migrations.lock().values().cloned().collect()
    }

    /// Registered names, ordered
    pub fn names(&self) -> Vec<String> {
        self.migrations.lock().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Migration>> {
        self.migrations.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.migrations.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.migrations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.lock().is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("migrations", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SqlMigration;

    fn migration(name: &str) -> Arc<dyn Migration> {
        Arc::new(SqlMigration::new(name, "CREATE TABLE t (id INT);", "DROP TABLE t;"))
    }

    #[test]
    fn test_sorted_by_name() {
        let registry = Registry::new();
        registry
            .register(vec![migration("003_c"), migration("001_a"), migration("002_b")])
            .unwrap();

        assert_eq!(registry.names(), vec!["001_a", "002_b", "003_c"]);
        let sorted: Vec<String> = registry.sorted().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(sorted, vec!["001_a", "002_b", "003_c"]);
    }

    #[test]
    fn test_duplicate_keeps_first_registration() {
        let registry = Registry::new();
        let first: Arc<dyn Migration> =
            Arc::new(SqlMigration::new("001_create_users", "CREATE TABLE users (id INT);", ""));
        registry.register(vec![first]).unwrap();

        let second: Arc<dyn Migration> =
            Arc::new(SqlMigration::new("001_create_users", "SELECT 1;", ""));
        let err = registry.register(vec![second]).unwrap_err();

        assert!(matches!(err, MigrateError::DuplicateMigrationName(ref name) if name == "001_create_users"));
        assert!(err.to_string().contains("registered more than once"));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("001_create_users").unwrap().up_script(),
            "CREATE TABLE users (id INT);"
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = Registry::new();
        let err = registry.register(vec![migration("")]).unwrap_err();
        assert!(matches!(err, MigrateError::MigrationNameMissing));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_partial_registration_within_one_call() {
        let registry = Registry::new();
        registry.register(vec![migration("002_b")]).unwrap();

        let result = registry.register(vec![migration("001_a"), migration("002_b"), migration("003_c")]);

        assert!(result.is_err());
        assert!(registry.contains("001_a"));
        assert!(!registry.contains("003_c"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register(vec![migration(&format!("{:03}_m", i))]))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(registry.len(), 8);
    }
}
