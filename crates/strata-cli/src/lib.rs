//! Command line front end for a [`Migrator`]
//!
//! Applications embed [`Cli`] in their own binary after registering their
//! migrations:
//!
//! ```rust,no_run
//! use strata::{MemoryDriver, Migrator};
//! use strata_cli::Cli;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let migrator = Migrator::builder().driver(MemoryDriver::new()).build()?;
//! Cli::new(migrator).execute().await
//! # }
//! ```

mod commands;
pub mod logging;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::ffi::OsString;
use strata::{Migrator, MigratorConfig};

/// Program name shown in help output unless overridden
pub const DEFAULT_PROGRAM_NAME: &str = "migration";

#[derive(Parser, Debug)]
#[command(about = "Database migration tool")]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

/// Migration subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show every migration and whether it has been applied
    List {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending migrations
    Migrate,

    /// Roll back the most recent migrations
    Rollback {
        /// Number of migrations to roll back
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(1..))]
        step: i64,
    },

    /// Drop all tables and apply every migration
    Fresh,

    /// Roll back every migration and apply them again
    Reset,

    /// Drop all tables
    Clean,

    /// Create a new migration file
    Create {
        /// Migration name
        name: String,
    },
}

/// Write a new migration file without a database connection
///
/// Uses the same directory and format as `Migrator::create` would with
/// `config`.
pub fn create_migration(config: &MigratorConfig, name: &str) -> anyhow::Result<()> {
    commands::scaffold(config, name)
}

/// Migration command line bound to a migrator
pub struct Cli {
    migrator: Migrator,
    program_name: String,
}

impl Cli {
    pub fn new(migrator: Migrator) -> Self {
        Self {
            migrator,
            program_name: DEFAULT_PROGRAM_NAME.to_string(),
        }
    }

    /// Name used in usage and help output
    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = name.into();
        self
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    /// Parse the process arguments and run the command
    pub async fn execute(&self) -> anyhow::Result<()> {
        self.execute_from(std::env::args_os()).await
    }

    /// Parse `args` (including the program name) and run the command
    ///
    /// `--help` and `--version` print and return `Ok`; any other parse error
    /// is returned.
    pub async fn execute_from<I, T>(&self, args: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match CliArgs::command()
            .bin_name(self.program_name.clone())
            .try_get_matches_from(args)
        {
            Ok(matches) => matches,
            Err(err) if !err.use_stderr() => {
                err.print()?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let args = CliArgs::from_arg_matches(&matches)?;
        self.run(args.command).await
    }

    /// Run an already parsed command
    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::List { json } => commands::list(&self.migrator, json).await,
            Commands::Migrate => commands::migrate(&self.migrator).await,
            Commands::Rollback { step } => commands::rollback(&self.migrator, step).await,
            Commands::Fresh => commands::fresh(&self.migrator).await,
            Commands::Reset => commands::reset(&self.migrator).await,
            Commands::Clean => commands::clean(&self.migrator).await,
            Commands::Create { name } => commands::create(&self.migrator, &name),
        }
    }
}
