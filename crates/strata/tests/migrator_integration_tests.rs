//! End-to-end tests of the migration engine against the in-memory driver

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use strata::{
    Direction, MemoryDriver, MigrateError, Migration, MigrationObserver, Migrator, MigratorConfig,
    SqlMigration,
};

fn migration(name: &str) -> Arc<dyn Migration> {
    Arc::new(SqlMigration::new(
        name,
        format!("CREATE TABLE t_{} (id INT);", name),
        format!("DROP TABLE t_{};", name),
    ))
}

fn setup(names: &[&str]) -> (MemoryDriver, Migrator) {
    let driver = MemoryDriver::new();
    let migrator = Migrator::builder().driver(driver.clone()).build().unwrap();
    migrator
        .register(names.iter().map(|name| migration(name)))
        .unwrap();
    (driver, migrator)
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl MigrationObserver for EventLog {
    fn on_running(&self, migration: &dyn Migration, direction: Direction) {
        self.0.lock().push(format!("running {} {}", direction, migration.name()));
    }

    fn on_success(&self, migration: &dyn Migration, direction: Direction) {
        self.0.lock().push(format!("success {} {}", direction, migration.name()));
    }

    fn on_failed(&self, migration: &dyn Migration, direction: Direction, _error: &MigrateError) {
        self.0.lock().push(format!("failed {} {}", direction, migration.name()));
    }
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    let (driver, migrator) = setup(&["001_a", "002_b"]);

    let first = migrator.migrate().await.unwrap();
    let second = migrator.migrate().await.unwrap();

    assert_eq!(first.applied_count(), 2);
    assert_eq!(second.applied_count(), 0);
    assert_eq!(driver.executed_scripts().len(), 2);
}

#[tokio::test]
async fn test_rollback_more_than_executed() {
    let (driver, migrator) = setup(&["001_a", "002_b", "003_c"]);
    migrator.migrate().await.unwrap();

    let result = migrator.rollback(99).await.unwrap();

    assert_eq!(result.rolled_back, vec!["003_c", "002_b", "001_a"]);
    assert!(driver.executed_names().is_empty());
}

#[tokio::test]
async fn test_rollback_one_step_undoes_latest() {
    let (driver, migrator) = setup(&["001_a", "002_b"]);
    migrator.migrate().await.unwrap();

    let result = migrator.rollback(1).await.unwrap();

    assert_eq!(result.rolled_back, vec!["002_b"]);
    assert_eq!(driver.executed_names(), vec!["001_a"]);
    assert_eq!(driver.executed_scripts().last().unwrap(), "DROP TABLE t_002_b;");
}

#[tokio::test]
async fn test_invalid_rollback_step_touches_nothing() {
    let (driver, migrator) = setup(&["001_a"]);

    assert!(matches!(
        migrator.rollback(0).await,
        Err(MigrateError::InvalidRollbackStep(0))
    ));
    assert!(matches!(
        migrator.rollback(-1).await,
        Err(MigrateError::InvalidRollbackStep(-1))
    ));
    assert_eq!(driver.total_calls(), 0);
}

#[tokio::test]
async fn test_rollback_with_nothing_executed() {
    let (driver, migrator) = setup(&["001_a"]);
    migrator.migrate().await.unwrap();
    migrator.rollback(1).await.unwrap();

    let result = migrator.rollback(1).await.unwrap();

    assert_eq!(result.rolled_back_count(), 0);
    assert_eq!(driver.calls("unapply_migrations"), 1);
}

#[tokio::test]
async fn test_rollback_skips_unregistered_migrations() {
    let (driver, migrator) = setup(&["001_a"]);
    migrator.migrate().await.unwrap();
    driver.seed_executed("002_removed", Utc::now());

    let result = migrator.rollback(1).await.unwrap();

    assert!(result.rolled_back.is_empty());
    assert_eq!(result.skipped_unknown, vec!["002_removed"]);
    assert_eq!(driver.executed_names(), vec!["001_a", "002_removed"]);
    assert_eq!(driver.calls("unapply_migrations"), 0);
}

#[tokio::test]
async fn test_list_reports_status() {
    let (driver, migrator) = setup(&["20240103_c", "20240101_a", "20240102_b"]);
    let applied_a = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let applied_b = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
    driver.seed_executed("20240101_a", applied_a);
    driver.seed_executed("20240102_b", applied_b);

    let list = migrator.list().await.unwrap();

    let names: Vec<_> = list.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["20240101_a", "20240102_b", "20240103_c"]);
    assert!(list[0].is_executed);
    assert_eq!(list[0].executed_at, Some(applied_a));
    assert!(list[1].is_executed);
    assert_eq!(list[1].executed_at, Some(applied_b));
    assert!(!list[2].is_executed);
    assert_eq!(list[2].executed_at, None);
    assert_eq!(list.pending().count(), 1);

    let rendered = list.to_string();
    assert!(rendered.contains("20240103_c"));
    assert!(rendered.contains("N/A"));
}

#[tokio::test]
async fn test_list_creates_bookkeeping_table() {
    let (driver, migrator) = setup(&["001_a"]);

    let list = migrator.list().await.unwrap();

    assert!(driver.has_migrations_table());
    assert!(!list[0].is_executed);
}

#[tokio::test]
async fn test_duplicate_registration_keeps_first() {
    let (_driver, migrator) = setup(&["001_a"]);
    let replacement: Arc<dyn Migration> =
        Arc::new(SqlMigration::new("001_a", "SELECT 2;", "SELECT 3;"));

    let err = migrator.register([replacement]).unwrap_err();

    assert!(matches!(err, MigrateError::DuplicateMigrationName(ref name) if name == "001_a"));
    let kept = migrator.registry().get("001_a").unwrap();
    assert_eq!(kept.up_script(), "CREATE TABLE t_001_a (id INT);");
    assert_eq!(migrator.registry().len(), 1);
}

#[tokio::test]
async fn test_reset_without_executed_migrations() {
    let (driver, migrator) = setup(&["001_a", "002_b"]);

    let result = migrator.reset().await.unwrap();

    assert_eq!(result.rollback.rolled_back_count(), 0);
    assert_eq!(result.migrate.applied, vec!["001_a", "002_b"]);
    assert_eq!(driver.calls("clean_database"), 0);
    assert_eq!(driver.calls("unapply_migrations"), 0);
}

#[tokio::test]
async fn test_reset_rolls_back_and_reapplies() {
    let (driver, migrator) = setup(&["001_a", "002_b"]);
    migrator.migrate().await.unwrap();

    let result = migrator.reset().await.unwrap();

    assert_eq!(result.rollback.rolled_back, vec!["002_b", "001_a"]);
    assert_eq!(result.migrate.applied, vec!["001_a", "002_b"]);
    assert_eq!(driver.executed_names(), vec!["001_a", "002_b"]);
}

#[tokio::test]
async fn test_reset_wraps_phase_errors() {
    let (driver, migrator) = setup(&["001_a"]);
    migrator.migrate().await.unwrap();
    driver.fail_on_down("001_a");

    let err = migrator.reset().await.unwrap_err();
    assert!(err.to_string().starts_with("rollback failed during reset"));
    assert_eq!(err.migration(), Some("001_a"));

    driver.clear_failures();
    driver.fail_on_up("001_a");
    let err = migrator.reset().await.unwrap_err();
    assert!(err.to_string().starts_with("migration failed during reset"));
}

#[tokio::test]
async fn test_fail_fast_on_second_migration() {
    let (driver, migrator) = setup(&[]);
    let events = Arc::new(EventLog::default());
    let migrator = migrator.with_observer(events.clone());
    migrator
        .register([migration("001_a"), migration("002_b"), migration("003_c")])
        .unwrap();
    driver.fail_on_up("002_b");

    let err = migrator.migrate().await.unwrap_err();

    assert_eq!(err.migration(), Some("002_b"));
    assert_eq!(driver.executed_names(), vec!["001_a"]);
    let events = events.0.lock();
    assert_eq!(
        *events,
        vec![
            "running up 001_a",
            "success up 001_a",
            "running up 002_b",
            "failed up 002_b",
        ]
    );
    assert!(!events.iter().any(|e| e.contains("003_c")));
}

#[tokio::test]
async fn test_fresh_drops_and_reapplies() {
    let (driver, migrator) = setup(&["001_a", "002_b"]);
    migrator.migrate().await.unwrap();
    driver.seed_executed("000_stale", Utc::now());

    let result = migrator.fresh().await.unwrap();

    assert_eq!(result.applied, vec!["001_a", "002_b"]);
    assert_eq!(driver.executed_names(), vec!["001_a", "002_b"]);
    assert_eq!(driver.calls("clean_database"), 1);
}

#[tokio::test]
async fn test_clean_only_drops() {
    let (driver, migrator) = setup(&["001_a"]);
    migrator.migrate().await.unwrap();

    migrator.clean().await.unwrap();

    assert!(driver.executed_names().is_empty());
    assert!(!driver.has_migrations_table());
    assert_eq!(driver.calls("apply_migrations"), 1);
}

#[tokio::test]
async fn test_invalid_table_name_fails_before_driver_calls() {
    let driver = MemoryDriver::new();
    let config = MigratorConfig {
        migration_table_name: "migrations;drop".to_string(),
        ..MigratorConfig::default()
    };

    let err = Migrator::new(Box::new(driver.clone()), config).unwrap_err();

    assert!(matches!(err.root(), MigrateError::InvalidTableName(_)));
    assert_eq!(driver.total_calls(), 0);
}

#[tokio::test]
async fn test_close_releases_driver() {
    let (driver, migrator) = setup(&[]);
    migrator.close().await.unwrap();
    assert!(driver.is_closed());
}

#[tokio::test]
async fn test_sql_directory_round_trip() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let driver = MemoryDriver::new();
    let migrator = Migrator::builder()
        .driver(driver.clone())
        .migration_files_dir(temp_dir.path())
        .scaffold_format(strata::ScaffoldFormat::Sql)
        .build()
        .unwrap();

    let path = migrator.create("create users").unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(
        &path,
        content
            .replace("-- Up migration\n", "-- Up migration\nCREATE TABLE users (id INT);\n")
            .replace("-- Down migration\n", "-- Down migration\nDROP TABLE users;\n"),
    )
    .unwrap();

    migrator
        .register(strata::load_sql_migrations(temp_dir.path()).unwrap())
        .unwrap();
    let result = migrator.migrate().await.unwrap();

    assert_eq!(result.applied_count(), 1);
    assert_eq!(driver.executed_scripts(), vec!["CREATE TABLE users (id INT);"]);
}
