//! Migrator configuration and builder

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::driver::{Driver, DEFAULT_MIGRATION_TABLE};
use crate::error::{MigrateError, MigrateResult};
use crate::migrator::Migrator;
use crate::sanitize::sanitize_table_name;

/// Environment variable overriding `migration_files_dir`
pub const ENV_MIGRATIONS_DIR: &str = "STRATA_MIGRATIONS_DIR";
/// Environment variable overriding `migration_table_name`
pub const ENV_MIGRATION_TABLE: &str = "STRATA_MIGRATION_TABLE";
/// Environment variable overriding `debug_sql`
pub const ENV_DEBUG_SQL: &str = "STRATA_DEBUG_SQL";

/// Kind of file written by `Migrator::create`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaffoldFormat {
    /// A Rust source file with a type implementing `Migration`
    #[default]
    Rust,
    /// A `.sql` file with up/down sections
    Sql,
}

/// Configuration for the migration engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Directory where `create` writes new migration files
    pub migration_files_dir: PathBuf,
    /// Name of the bookkeeping table
    pub migration_table_name: String,
    /// Log every script before it runs
    pub debug_sql: bool,
    /// What `create` generates
    pub scaffold_format: ScaffoldFormat,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            migration_files_dir: PathBuf::from("migrations"),
            migration_table_name: DEFAULT_MIGRATION_TABLE.to_string(),
            debug_sql: false,
            scaffold_format: ScaffoldFormat::Rust,
        }
    }
}

impl MigratorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MigrateError::ConfigMissing(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: MigratorConfig = serde_yaml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded migration config");
        Ok(config)
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `STRATA_*` environment variables on top of this configuration
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = env::var(ENV_MIGRATIONS_DIR) {
            self.migration_files_dir = PathBuf::from(dir);
        }
        if let Ok(table) = env::var(ENV_MIGRATION_TABLE) {
            self.migration_table_name = table;
        }
        if let Ok(debug) = env::var(ENV_DEBUG_SQL) {
            self.debug_sql = matches!(debug.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        self
    }

    /// Fill empty fields with their defaults
    pub fn normalized(mut self) -> Self {
        if self.migration_files_dir.as_os_str().is_empty() {
            self.migration_files_dir = PathBuf::from("migrations");
        }
        if self.migration_table_name.is_empty() {
            self.migration_table_name = DEFAULT_MIGRATION_TABLE.to_string();
        }
        self
    }

    /// Check the configuration before any database access
    pub fn validate(&self) -> MigrateResult<()> {
        sanitize_table_name(&self.migration_table_name)
            .map_err(|e| e.context("invalid migration table name"))?;
        Ok(())
    }
}

/// Builder for [`Migrator`]
#[derive(Default)]
pub struct MigratorBuilder {
    driver: Option<Box<dyn Driver>>,
    config: MigratorConfig,
}

impl MigratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database driver (required)
    pub fn driver<D: Driver + 'static>(mut self, driver: D) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    /// Database driver that is already boxed
    pub fn boxed_driver(mut self, driver: Box<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: MigratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn migration_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.migration_files_dir = dir.into();
        self
    }

    pub fn migration_table_name(mut self, name: impl Into<String>) -> Self {
        self.config.migration_table_name = name.into();
        self
    }

    pub fn debug_sql(mut self, enabled: bool) -> Self {
        self.config.debug_sql = enabled;
        self
    }

    pub fn scaffold_format(mut self, format: ScaffoldFormat) -> Self {
        self.config.scaffold_format = format;
        self
    }

    /// Validate the configuration and create the migrator
    pub fn build(self) -> MigrateResult<Migrator> {
        let driver = self.driver.ok_or(MigrateError::DriverMissing)?;
        Migrator::new(driver, self.config)
    }
}
