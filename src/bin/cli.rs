use sqlx::Row;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use restaurant_ops::models::user::Role;
use restaurant_ops::utils::{normalize_email, utc_now};

#[derive(Parser, Debug)]
#[command(author, version, about = "restaurant-ops admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty reversible migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Assign a role to an existing user, e.g. to bootstrap ops leads
    SetRole { email: String, role: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // fall back to the crate-local `.env` when the CWD differs (containers)
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let (up, down) = make_migration_files(&name)?;
            println!("Created migration: {}", up.display());
            println!("Created migration: {}", down.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            let target = last_applied_version(&pool).await?.context("no migrations have been applied")?;
            migrator
                .undo(&pool, target - 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back migration {}", target);
        }
        Commands::SetRole { email, role } => {
            let role: Role = role
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown role '{}', expected one of: {}", role, role_names()))?;
            let pool = get_pool().await?;
            set_role(&pool, &normalize_email(&email), role).await?;
            println!("{} is now {}", email, role);
        }
    }

    Ok(())
}

fn make_migration_files(name: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let dir = Path::new("migrations");
    let up = dir.join(format!("{}_{}.up.sql", timestamp, sanitized));
    let down = dir.join(format!("{}_{}.down.sql", timestamp, sanitized));

    if up.exists() || down.exists() {
        anyhow::bail!("migration already exists: {}", up.display());
    }

    fs::write(&up, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", up.display()))?;
    fs::write(&down, "-- Revert the matching .up.sql here\n")
        .with_context(|| format!("failed to create migration at {}", down.display()))?;

    Ok((up, down))
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn migrations_table_exists(pool: &SqlitePool) -> anyhow::Result<bool> {
    let row = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

async fn last_applied_version(pool: &SqlitePool) -> anyhow::Result<Option<i64>> {
    if !migrations_table_exists(pool).await? {
        return Ok(None);
    }
    let version = sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let applied_versions: HashSet<i64> = if migrations_table_exists(pool).await? {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter().filter(|m| m.migration_type.is_up_migration()) {
        let version = migration.version;
        let status = if applied_versions.contains(&version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

async fn set_role(pool: &SqlitePool, email: &str, role: Role) -> anyhow::Result<()> {
    let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE email = ? AND deleted_at IS NULL")
        .bind(role.as_str())
        .bind(utc_now())
        .bind(email)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("no active user with email {}", email);
    }
    Ok(())
}

fn role_names() -> String {
    Role::ALL.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // ./migrations when run from the repo root, else the crate-local folder
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
