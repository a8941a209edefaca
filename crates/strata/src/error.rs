//! Error types for the migration system
//!
//! Every failure the engine, registry, scaffold generator or a driver can
//! produce is a distinct [`MigrateError`] variant so callers (and the CLI)
//! can tell configuration problems apart from database failures.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by migration operations
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("config not provided: {0}")]
    ConfigMissing(String),

    #[error("driver not provided")]
    DriverMissing,

    #[error("migration directory {} does not exist", .0.display())]
    MigrationDirMissing(PathBuf),

    #[error("migration name not provided")]
    MigrationNameMissing,

    #[error("migration {0} registered more than once")]
    DuplicateMigrationName(String),

    #[error("migration file already exists: {}", .0.display())]
    MigrationFileAlreadyExists(PathBuf),

    #[error("invalid rollback step: {0}")]
    InvalidRollbackStep(i64),

    #[error("invalid migration name: {0}")]
    InvalidMigrationName(String),

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    #[error("{}", describe_storage(.migration.as_deref(), .message))]
    Storage {
        /// Migration being executed when the failure happened, if any
        migration: Option<String>,
        message: String,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

fn describe_storage(migration: Option<&str>, message: &str) -> String {
    match migration {
        Some(name) => format!("migration {}: {}", name, message),
        None => format!("storage error: {}", message),
    }
}

impl MigrateError {
    /// Create a storage error that is not tied to a migration
    pub fn storage(message: impl Into<String>) -> Self {
        MigrateError::Storage {
            migration: None,
            message: message.into(),
        }
    }

    /// Attach the failing migration's name to a storage error
    ///
    /// Non-storage errors are wrapped so the name still shows up in the message.
    pub fn for_migration(self, name: &str) -> Self {
        match self {
            MigrateError::Storage { message, .. } => MigrateError::Storage {
                migration: Some(name.to_string()),
                message,
            },
            other => MigrateError::Storage {
                migration: Some(name.to_string()),
                message: other.to_string(),
            },
        }
    }

    /// Wrap the error with a description of the phase that failed
    pub fn context(self, context: impl Into<String>) -> Self {
        MigrateError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any [`MigrateError::Context`] layers
    pub fn root(&self) -> &MigrateError {
        let mut current = self;
        while let MigrateError::Context { source, .. } = current {
            current = source;
        }
        current
    }

    /// Name of the migration the failure is attributed to, if known
    pub fn migration(&self) -> Option<&str> {
        match self.root() {
            MigrateError::Storage { migration, .. } => migration.as_deref(),
            _ => None,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        MigrateError::storage(err.to_string())
    }
}

impl From<serde_yaml::Error> for MigrateError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrateError::Config(err.to_string())
    }
}
