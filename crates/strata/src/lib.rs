//! # strata
//!
//! Schema migrations for SQL databases.
//!
//! ## Features
//!
//! - **Ordered migrations**: named, reversible scripts applied in name order
//! - **Bookkeeping table**: applied migrations are recorded in the database
//! - **Rollback, reset and fresh**: walk the schema back or rebuild it
//! - **Pluggable drivers**: PostgreSQL through sqlx, plus an in-memory driver
//! - **Scaffolding**: generate timestamped migration files
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use strata::{MemoryDriver, Migration, Migrator, SqlMigration};
//!
//! struct CreateUsers;
//!
//! impl Migration for CreateUsers {
//!     fn name(&self) -> &str {
//!         "20240101120000_create_users"
//!     }
//!
//!     fn up_script(&self) -> &str {
//!         "CREATE TABLE users (id SERIAL PRIMARY KEY);"
//!     }
//!
//!     fn down_script(&self) -> &str {
//!         "DROP TABLE users;"
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let migrator = Migrator::builder()
//!     .driver(MemoryDriver::new())
//!     .migration_table_name("schema_migrations")
//!     .build()
//!     .unwrap();
//!
//! migrator.register_migration(CreateUsers).unwrap();
//! migrator
//!     .register([Arc::new(SqlMigration::new(
//!         "20240102090000_create_posts",
//!         "CREATE TABLE posts (id SERIAL PRIMARY KEY);",
//!         "DROP TABLE posts;",
//!     )) as Arc<dyn Migration>])
//!     .unwrap();
//!
//! let result = migrator.migrate().await.unwrap();
//! assert_eq!(result.applied_count(), 2);
//!
//! migrator.rollback(1).await.unwrap();
//! migrator.list().await.unwrap().print();
//! migrator.close().await.unwrap();
//! # });
//! ```

pub mod config;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod migration;
pub mod migrator;
pub mod registry;
pub mod sanitize;
pub mod scaffold;
pub mod source;

pub use config::{MigratorBuilder, MigratorConfig, ScaffoldFormat};
pub use driver::{Direction, Driver, MigrationObserver, NoopObserver, DEFAULT_MIGRATION_TABLE};
pub use drivers::MemoryDriver;
pub use error::{MigrateError, MigrateResult};
pub use migration::{ExecutedMigration, Migration, RegisteredMigration, RegisteredMigrationList};
pub use migrator::{MigrationRunResult, Migrator, ResetResult, RollbackResult};
pub use registry::Registry;
pub use sanitize::{sanitize_migration_name, sanitize_table_name};
pub use source::{load_sql_migrations, SqlMigration};

#[cfg(feature = "postgres")]
pub use drivers::{PostgresDriver, TransactionMode};
