use anyhow::Context;
use strata::scaffold::create_migration_file;
use strata::{Migrator, MigratorConfig};

pub async fn list(migrator: &Migrator, json: bool) -> anyhow::Result<()> {
    let migrations = migrator.list().await?;

    if json {
        let output = serde_json::to_string_pretty(&migrations).context("failed to encode migration list")?;
        println!("{}", output);
    } else if migrations.is_empty() {
        println!("No migrations registered");
    } else {
        migrations.print();
    }
    Ok(())
}

pub async fn migrate(migrator: &Migrator) -> anyhow::Result<()> {
    let result = migrator.migrate().await?;

    if result.applied.is_empty() {
        println!("Nothing to migrate");
    } else {
        for name in &result.applied {
            println!("Migrated: {}", name);
        }
        println!(
            "Applied {} migration(s) in {}ms",
            result.applied_count(),
            result.execution_time_ms
        );
    }
    Ok(())
}

pub async fn rollback(migrator: &Migrator, step: i64) -> anyhow::Result<()> {
    let result = migrator.rollback(step).await?;

    for name in &result.skipped_unknown {
        println!("Skipped (not registered): {}", name);
    }
    if result.rolled_back.is_empty() {
        println!("Nothing to roll back");
    } else {
        for name in &result.rolled_back {
            println!("Rolled back: {}", name);
        }
    }
    Ok(())
}

pub async fn fresh(migrator: &Migrator) -> anyhow::Result<()> {
    let result = migrator.fresh().await?;
    println!("Dropped all tables and applied {} migration(s)", result.applied_count());
    Ok(())
}

pub async fn reset(migrator: &Migrator) -> anyhow::Result<()> {
    let result = migrator.reset().await?;
    println!(
        "Rolled back {} and applied {} migration(s)",
        result.rollback.rolled_back_count(),
        result.migrate.applied_count()
    );
    Ok(())
}

pub async fn clean(migrator: &Migrator) -> anyhow::Result<()> {
    migrator.clean().await?;
    println!("Dropped all tables");
    Ok(())
}

pub fn create(migrator: &Migrator, name: &str) -> anyhow::Result<()> {
    scaffold(migrator.config(), name)
}

pub fn scaffold(config: &MigratorConfig, name: &str) -> anyhow::Result<()> {
    let path = create_migration_file(&config.migration_files_dir, name, config.scaffold_format)?;
    println!("Created migration: {}", path.display());
    Ok(())
}
