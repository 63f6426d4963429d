use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::migrate::{AppliedMigration, Migrate};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use super::Db;
use crate::Result;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub const fn migrator() -> &'static sqlx::migrate::Migrator {
    &MIGRATOR
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MigrationLabel {
    pub version: i64,
    pub description: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MigrationSnapshot {
    pub latest_applied: Option<i64>,
    pub latest_available: Option<i64>,
    pub applied: Vec<MigrationLabel>,
    pub pending: Vec<MigrationLabel>,
}

pub async fn init_pool(database_url: &str) -> Result<Db> {
    let is_memory = database_url.starts_with("sqlite::memory");
    ensure_db_dir(database_url)?;

    let mut opts = SqliteConnectOptions::from_str(database_url)?;
    opts = opts.create_if_missing(true).foreign_keys(true);
    if !is_memory {
        opts = opts.journal_mode(SqliteJournalMode::Wal);
    }

    // An in-memory SQLite database is private to its connection, so the pool
    // is pinned to a single connection that is never recycled. File databases
    // get WAL and a small pool.
    let pool_opts = if is_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_opts
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(opts)
        .await?;

    Ok(pool)
}

fn ensure_db_dir(database_url: &str) -> Result<()> {
    if let Some(path_str) = database_url.strip_prefix("sqlite://")
        && !database_url.starts_with("sqlite::memory")
    {
        let path = Path::new(path_str);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn latest_migration_version() -> Option<i64> {
    migrator().iter().map(|m| m.version).max()
}

pub async fn migration_snapshot(pool: &Db) -> Result<MigrationSnapshot> {
    let applied = fetch_applied_migrations(pool).await?;
    let descriptions: HashMap<i64, String> = migrator()
        .iter()
        .map(|m| (m.version, m.description.to_string()))
        .collect();
    let applied_labels: Vec<MigrationLabel> = applied
        .iter()
        .map(|m| MigrationLabel {
            version: m.version,
            description: descriptions
                .get(&m.version)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
        })
        .collect();

    let applied_versions: HashSet<i64> = applied.iter().map(|m| m.version).collect();
    let pending: Vec<MigrationLabel> = migrator()
        .iter()
        .filter(|m| !applied_versions.contains(&m.version))
        .map(|m| MigrationLabel {
            version: m.version,
            description: m.description.to_string(),
        })
        .collect();

    let latest_applied = applied.iter().map(|m| m.version).max();

    Ok(MigrationSnapshot {
        latest_applied,
        latest_available: latest_migration_version(),
        applied: applied_labels,
        pending,
    })
}

pub async fn validate_migrations(pool: &Db) -> Result<()> {
    let applied = fetch_applied_migrations(pool).await?;
    let known: HashMap<i64, &sqlx::migrate::Migration> =
        migrator().iter().map(|m| (m.version, m)).collect();

    for migration in &applied {
        let Some(defined) = known.get(&migration.version) else {
            anyhow::bail!(
                "database has unknown migration version {}",
                migration.version
            );
        };

        if defined.checksum != migration.checksum {
            anyhow::bail!(
                "migration {} checksum mismatch between database and binary",
                migration.version
            );
        }
    }

    Ok(())
}

/// Applies pending migrations and returns the labels applied by this run.
pub async fn run_migrations(pool: &Db) -> Result<Vec<MigrationLabel>> {
    let before = migration_snapshot(pool).await?;
    validate_migrations(pool).await?;

    if before.pending.is_empty() {
        return Ok(Vec::new());
    }

    let previously_applied: HashSet<i64> = before.applied.iter().map(|m| m.version).collect();
    migrator()
        .run(pool)
        .await
        .context("applying database migrations failed")?;

    let after = migration_snapshot(pool).await?;
    Ok(after
        .applied
        .into_iter()
        .filter(|m| !previously_applied.contains(&m.version))
        .collect())
}

async fn fetch_applied_migrations(pool: &Db) -> Result<Vec<AppliedMigration>> {
    let mut conn = pool.acquire().await?;
    conn.ensure_migrations_table()
        .await
        .context("ensure migrations table exists")?;

    if let Some(version) = conn.dirty_version().await? {
        anyhow::bail!("database is in a dirty migration state at version {version}");
    }

    let applied = conn
        .list_applied_migrations()
        .await
        .context("list applied migrations")?;

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("db.sqlite");
        let url = format!("sqlite://{}", db_path.display());
        ensure_db_dir(&url).expect("ensure");
        assert!(db_path.parent().expect("parent").exists());
    }

    #[tokio::test]
    async fn migration_snapshot_reports_pending_for_fresh_db() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        let snapshot = migration_snapshot(&pool).await.expect("snapshot");
        let total = migrator().iter().count();
        assert!(snapshot.applied.is_empty());
        assert_eq!(snapshot.pending.len(), total);
        assert_eq!(snapshot.latest_applied, None);
        assert_eq!(snapshot.latest_available, latest_migration_version());
    }

    #[tokio::test]
    async fn run_migrations_is_idempotent() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        let first = run_migrations(&pool).await.expect("first run");
        assert!(!first.is_empty());

        let second = run_migrations(&pool).await.expect("second run");
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn memory_pool_keeps_data_across_acquires() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        sqlx::query(
            "INSERT INTO honeypots (name, kind, host, port, status) \
             VALUES ('probe', 'ssh', '0.0.0.0', 2222, 'active')",
        )
        .execute(&pool)
        .await
        .expect("insert");

        // Each query checks a connection back out of the pool; the row must
        // still be there because the memory database lives on that one
        // connection.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM honeypots")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        let err = sqlx::query(
            "INSERT INTO events (honeypot_id, ip_address, event_type) VALUES (999, '1.2.3.4', 'other')",
        )
        .execute(&pool)
        .await
        .expect_err("orphan event insert should fail");
        assert!(err.to_string().to_lowercase().contains("foreign key"));
    }
}
