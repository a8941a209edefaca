use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use strata::{load_sql_migrations, Migrator, MigratorConfig, PostgresDriver, ScaffoldFormat};
use strata_cli::{create_migration, logging::init_logging, Cli, Commands};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Run SQL file migrations against PostgreSQL", version)]
struct Args {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging("info", args.log_json)?;

    let config = match &args.config {
        Some(path) => MigratorConfig::from_file(path)?,
        None => MigratorConfig::default(),
    };
    let config = MigratorConfig {
        scaffold_format: ScaffoldFormat::Sql,
        ..config.with_env_overrides()
    };

    if let Commands::Create { name } = &args.command {
        return create_migration(&config, name);
    }

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let driver = PostgresDriver::connect(&database_url).await?;

    let migrations_dir = config.migration_files_dir.clone();
    let migrator = Migrator::builder().driver(driver).config(config).build()?;

    if migrations_dir.is_dir() {
        migrator.register(load_sql_migrations(&migrations_dir)?)?;
    } else {
        tracing::warn!(dir = %migrations_dir.display(), "migrations directory not found");
    }

    let cli = Cli::new(migrator).with_program_name("strata");
    let result = cli.run(args.command).await;

    cli.migrator().close().await?;
    result
}
