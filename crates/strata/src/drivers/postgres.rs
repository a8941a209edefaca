//! PostgreSQL driver implementation
//!
//! Runs migration scripts through sqlx. Scripts are sent with the simple
//! query protocol, so one script may contain several statements.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres, Row};
use std::sync::Arc;

use crate::driver::{Direction, Driver, MigrationObserver, DEFAULT_MIGRATION_TABLE};
use crate::error::{MigrateError, MigrateResult};
use crate::migration::{ExecutedMigration, Migration};
use crate::sanitize::sanitize_table_name;

/// How much of a migration runs inside one database transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Script and bookkeeping row of each migration commit together
    #[default]
    PerMigration,
    /// Statements run directly on the pool; a failing script may leave
    /// partial effects behind
    None,
}

/// PostgreSQL migration driver
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    pool: PgPool,
    migration_table_name: String,
    schema: String,
    transaction_mode: TransactionMode,
}

impl PostgresDriver {
    /// Connect to the database at `database_url` and verify the connection
    pub async fn connect(database_url: &str) -> MigrateResult<Self> {
        validate_database_url(database_url)?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .map_err(|e| MigrateError::storage(format!("failed to connect to database: {}", e)))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| MigrateError::storage(format!("database ping failed: {}", e)))?;

        tracing::debug!("connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Use an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            migration_table_name: DEFAULT_MIGRATION_TABLE.to_string(),
            schema: "public".to_string(),
            transaction_mode: TransactionMode::default(),
        }
    }

    /// Schema emptied by `clean_database` (default `public`)
    pub fn with_schema(mut self, schema: &str) -> MigrateResult<Self> {
        self.schema = sanitize_table_name(schema)?.to_string();
        Ok(self)
    }

    pub fn with_transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    pub fn transaction_mode(&self) -> TransactionMode {
        self.transaction_mode
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migration(&self, migration: &dyn Migration, direction: Direction) -> MigrateResult<()> {
        let script = direction.script(migration);

        match self.transaction_mode {
            TransactionMode::PerMigration => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| MigrateError::storage(format!("failed to start transaction: {}", e)))?;

                execute_script(&mut *tx, script, direction).await?;
                record(&mut *tx, &self.migration_table_name, migration.name(), direction).await?;

                tx.commit()
                    .await
                    .map_err(|e| MigrateError::storage(format!("failed to commit: {}", e)))?;
            }
            TransactionMode::None => {
                execute_script(&self.pool, script, direction).await?;
                record(&self.pool, &self.migration_table_name, migration.name(), direction).await?;
            }
        }

        Ok(())
    }

    async fn run_batch(
        &self,
        migrations: &[Arc<dyn Migration>],
        direction: Direction,
        observer: &dyn MigrationObserver,
    ) -> MigrateResult<()> {
        for migration in migrations {
            let migration = migration.as_ref();
            observer.on_running(migration, direction);

            if let Err(err) = self.run_migration(migration, direction).await {
                let err = err.for_migration(migration.name());
                observer.on_failed(migration, direction, &err);
                return Err(err);
            }

            observer.on_success(migration, direction);
        }
        Ok(())
    }
}

async fn execute_script<'e, E>(executor: E, script: &str, direction: Direction) -> MigrateResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    if script.trim().is_empty() {
        return Ok(());
    }

    executor.execute(script).await.map_err(|e| {
        let verb = match direction {
            Direction::Up => "apply",
            Direction::Down => "unapply",
        };
        MigrateError::storage(format!("failed to {}: {}", verb, e))
    })?;
    Ok(())
}

async fn record<'e, E>(executor: E, table: &str, name: &str, direction: Direction) -> MigrateResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    match direction {
        Direction::Up => {
            let sql = insert_migration_sql(table);
            sqlx::query(&sql)
                .bind(name)
                .bind(Utc::now().naive_utc())
                .execute(executor)
                .await
                .map_err(|e| MigrateError::storage(format!("failed to record: {}", e)))?;
        }
        Direction::Down => {
            let sql = remove_migration_sql(table);
            sqlx::query(&sql)
                .bind(name)
                .execute(executor)
                .await
                .map_err(|e| MigrateError::storage(format!("failed to remove record: {}", e)))?;
        }
    }
    Ok(())
}

/// Check that `url` uses a PostgreSQL scheme
pub fn validate_database_url(url: &str) -> MigrateResult<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| MigrateError::Config(format!("invalid database URL: {}", e)))?;

    match parsed.scheme() {
        "postgres" | "postgresql" => Ok(()),
        other => Err(MigrateError::Config(format!(
            "unsupported database URL scheme '{}', expected postgres://",
            other
        ))),
    }
}

fn create_migrations_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
            name VARCHAR(255) PRIMARY KEY NOT NULL,\n    \
            executed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n\
        )",
        table
    )
}

fn executed_migrations_sql(table: &str, reverse: bool) -> String {
    let order = if reverse { "DESC" } else { "ASC" };
    format!(
        "SELECT name, executed_at FROM {} ORDER BY name COLLATE \"C\" {}",
        table, order
    )
}

fn insert_migration_sql(table: &str) -> String {
    format!("INSERT INTO {} (name, executed_at) VALUES ($1, $2)", table)
}

fn remove_migration_sql(table: &str) -> String {
    format!("DELETE FROM {} WHERE name = $1", table)
}

fn drop_tables_sql(schema: &str, tables: &[String]) -> String {
    let quoted: Vec<String> = tables
        .iter()
        .map(|table| format!("\"{}\".\"{}\"", schema, table.replace('"', "\"\"")))
        .collect();
    format!("DROP TABLE IF EXISTS {} CASCADE", quoted.join(", "))
}

#[async_trait]
impl Driver for PostgresDriver {
    fn set_migration_table_name(&mut self, name: &str) {
        self.migration_table_name = if name.is_empty() {
            DEFAULT_MIGRATION_TABLE.to_string()
        } else {
            name.to_string()
        };
    }

    async fn create_migrations_table(&self) -> MigrateResult<()> {
        let sql = create_migrations_table_sql(&self.migration_table_name);
        self.pool
            .execute(sql.as_str())
            .await
            .map_err(|e| MigrateError::storage(format!("failed to create migrations table: {}", e)))?;
        Ok(())
    }

    async fn get_executed_migrations(&self, reverse: bool) -> MigrateResult<Vec<ExecutedMigration>> {
        let sql = executed_migrations_sql(&self.migration_table_name, reverse);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::storage(format!("failed to query executed migrations: {}", e)))?;

        let mut executed = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let executed_at: Option<NaiveDateTime> = row.try_get("executed_at")?;
            let executed_at = executed_at.ok_or_else(|| {
                MigrateError::storage(format!("executed_at is NULL for migration {}", name))
            })?;

            executed.push(ExecutedMigration {
                name,
                executed_at: DateTime::from_naive_utc_and_offset(executed_at, Utc),
            });
        }

        Ok(executed)
    }

    async fn clean_database(&self) -> MigrateResult<()> {
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT tablename FROM pg_tables WHERE schemaname = $1")
                .bind(&self.schema)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MigrateError::storage(format!("failed to query table names: {}", e)))?;

        if tables.is_empty() {
            tracing::debug!(schema = %self.schema, "no tables to drop");
            return Ok(());
        }

        let sql = drop_tables_sql(&self.schema, &tables);
        self.pool
            .execute(sql.as_str())
            .await
            .map_err(|e| MigrateError::storage(format!("failed to drop tables: {}", e)))?;

        tracing::info!(schema = %self.schema, count = tables.len(), "dropped all tables");
        Ok(())
    }

    async fn apply_migrations(
        &self,
        migrations: &[Arc<dyn Migration>],
        observer: &dyn MigrationObserver,
    ) -> MigrateResult<()> {
        self.run_batch(migrations, Direction::Up, observer).await
    }

    async fn unapply_migrations(
        &self,
        migrations: &[Arc<dyn Migration>],
        observer: &dyn MigrationObserver,
    ) -> MigrateResult<()> {
        self.run_batch(migrations, Direction::Down, observer).await
    }

    async fn close(&self) -> MigrateResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
