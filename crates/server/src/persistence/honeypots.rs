use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use super::Db;
use crate::Result;

/// Honeypot row joined with its event count.
#[derive(Debug, Clone, FromRow)]
pub struct HoneypotRecord {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub host: String,
    pub port: i64,
    pub status: String,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub events_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewHoneypot {
    pub name: String,
    pub kind: String,
    pub host: String,
    pub port: i64,
    pub status: String,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatedHoneypot {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub status: Option<String>,
}

const SELECT_WITH_COUNT: &str = r#"
    SELECT
        h.id,
        h.name,
        h.kind,
        h.host,
        h.port,
        h.status,
        h.container_id,
        h.container_name,
        h.created_at,
        COUNT(e.id) AS events_count
    FROM honeypots h
    LEFT JOIN events e ON e.honeypot_id = h.id
"#;

/// Inserts a honeypot inside a caller-owned transaction and returns the new
/// row id. Committing is the caller's responsibility.
pub async fn insert_honeypot(conn: &mut SqliteConnection, new: NewHoneypot) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO honeypots (name, kind, host, port, status, container_id, container_name, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING id
        "#,
    )
    .bind(&new.name)
    .bind(&new.kind)
    .bind(&new.host)
    .bind(new.port)
    .bind(&new.status)
    .bind(&new.container_id)
    .bind(&new.container_name)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;

    Ok(id)
}

pub async fn get_honeypot(pool: &Db, id: i64) -> Result<Option<HoneypotRecord>> {
    let query = format!("{SELECT_WITH_COUNT} WHERE h.id = ?1 GROUP BY h.id");
    let record = sqlx::query_as::<_, HoneypotRecord>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

pub async fn list_honeypots(pool: &Db) -> Result<Vec<HoneypotRecord>> {
    let query = format!("{SELECT_WITH_COUNT} GROUP BY h.id ORDER BY h.id");
    let records = sqlx::query_as::<_, HoneypotRecord>(&query)
        .fetch_all(pool)
        .await?;

    Ok(records)
}

/// Honeypots that still reference a container, candidates for forwarder
/// re-attachment after a restart.
pub async fn list_with_containers(pool: &Db) -> Result<Vec<HoneypotRecord>> {
    let query =
        format!("{SELECT_WITH_COUNT} WHERE h.container_id IS NOT NULL GROUP BY h.id ORDER BY h.id");
    let records = sqlx::query_as::<_, HoneypotRecord>(&query)
        .fetch_all(pool)
        .await?;

    Ok(records)
}

pub async fn update_honeypot(pool: &Db, id: i64, update: UpdatedHoneypot) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE honeypots
        SET name = COALESCE(?2, name),
            kind = COALESCE(?3, kind),
            host = COALESCE(?4, host),
            port = COALESCE(?5, port),
            status = COALESCE(?6, status)
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(update.name)
    .bind(update.kind)
    .bind(update.host)
    .bind(update.port)
    .bind(update.status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn set_status(pool: &Db, id: i64, status: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE honeypots SET status = ?2 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Deletes a honeypot; associated events go with it via the cascading
/// foreign key.
pub async fn delete_honeypot(pool: &Db, id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM honeypots WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::migrations;

    async fn test_pool() -> Db {
        let pool = migrations::init_pool("sqlite::memory:").await.expect("pool");
        migrations::run_migrations(&pool).await.expect("migrations");
        pool
    }

    fn sample(name: &str) -> NewHoneypot {
        NewHoneypot {
            name: name.to_string(),
            kind: "ssh".to_string(),
            host: "0.0.0.0".to_string(),
            port: 2222,
            status: "active".to_string(),
            container_id: Some("c1".to_string()),
            container_name: Some("ssh-node-1a2b3c4d".to_string()),
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trip() {
        let pool = test_pool().await;
        let mut tx = pool.begin().await.expect("begin");
        let id = insert_honeypot(&mut tx, sample("edge-ssh")).await.expect("insert");
        tx.commit().await.expect("commit");

        let record = get_honeypot(&pool, id).await.expect("get").expect("exists");
        assert_eq!(record.name, "edge-ssh");
        assert_eq!(record.kind, "ssh");
        assert_eq!(record.port, 2222);
        assert_eq!(record.events_count, 0);
        assert_eq!(record.container_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn update_patches_only_provided_fields() {
        let pool = test_pool().await;
        let mut tx = pool.begin().await.expect("begin");
        let id = insert_honeypot(&mut tx, sample("before")).await.expect("insert");
        tx.commit().await.expect("commit");

        let rows = update_honeypot(
            &pool,
            id,
            UpdatedHoneypot {
                name: Some("after".to_string()),
                status: Some("inactive".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update");
        assert_eq!(rows, 1);

        let record = get_honeypot(&pool, id).await.expect("get").expect("exists");
        assert_eq!(record.name, "after");
        assert_eq!(record.status, "inactive");
        assert_eq!(record.kind, "ssh");
        assert_eq!(record.port, 2222);
    }

    #[tokio::test]
    async fn update_missing_row_affects_nothing() {
        let pool = test_pool().await;
        let rows = update_honeypot(&pool, 42, UpdatedHoneypot::default())
            .await
            .expect("update");
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn invalid_kind_violates_check_constraint() {
        let pool = test_pool().await;
        let mut tx = pool.begin().await.expect("begin");
        let mut bad = sample("bad");
        bad.kind = "ftp".to_string();
        let err = insert_honeypot(&mut tx, bad).await.expect_err("check");
        assert!(err.to_string().to_lowercase().contains("check"));
    }

    #[tokio::test]
    async fn list_with_containers_skips_detached_rows() {
        let pool = test_pool().await;
        let mut tx = pool.begin().await.expect("begin");
        insert_honeypot(&mut tx, sample("attached")).await.expect("insert");
        let mut detached = sample("detached");
        detached.container_id = None;
        detached.container_name = None;
        insert_honeypot(&mut tx, detached).await.expect("insert");
        tx.commit().await.expect("commit");

        let rows = list_with_containers(&pool).await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "attached");
    }
}
