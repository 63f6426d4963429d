use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use super::Db;
use crate::Result;

#[derive(Debug, Clone, FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub honeypot_id: i64,
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub honeypot_id: i64,
    pub ip_address: String,
    pub event_type: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilters {
    pub honeypot_id: Option<i64>,
    pub ip_address: Option<String>,
    pub event_type: Option<String>,
}

/// Checks for the owning honeypot inside the caller's transaction so the
/// existence check and the insert observe the same snapshot.
pub async fn honeypot_exists(conn: &mut SqliteConnection, honeypot_id: i64) -> Result<bool> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM honeypots WHERE id = ?1")
        .bind(honeypot_id)
        .fetch_optional(conn)
        .await?;

    Ok(exists.is_some())
}

/// Inserts one event inside a caller-owned transaction. Batch writers compose
/// several inserts into a single transaction; `ingest_event` wraps one insert
/// in its own.
pub async fn insert_event(conn: &mut SqliteConnection, new: NewEvent) -> Result<EventRecord> {
    let record = sqlx::query_as::<_, EventRecord>(
        r#"
        INSERT INTO events (honeypot_id, ip_address, timestamp, event_type, details)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING id, honeypot_id, ip_address, timestamp, event_type, details
        "#,
    )
    .bind(new.honeypot_id)
    .bind(&new.ip_address)
    .bind(Utc::now())
    .bind(&new.event_type)
    .bind(&new.details)
    .fetch_one(conn)
    .await?;

    Ok(record)
}

pub async fn get_event(pool: &Db, id: i64) -> Result<Option<EventRecord>> {
    let record = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, honeypot_id, ip_address, timestamp, event_type, details
        FROM events
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn list_events(pool: &Db, filters: EventFilters) -> Result<Vec<EventRecord>> {
    let mut builder = QueryBuilder::new(
        "SELECT id, honeypot_id, ip_address, timestamp, event_type, details FROM events WHERE 1 = 1",
    );

    if let Some(honeypot_id) = filters.honeypot_id {
        builder.push(" AND honeypot_id = ").push_bind(honeypot_id);
    }
    if let Some(ip_address) = filters.ip_address {
        builder.push(" AND ip_address = ").push_bind(ip_address);
    }
    if let Some(event_type) = filters.event_type {
        builder.push(" AND event_type = ").push_bind(event_type);
    }
    builder.push(" ORDER BY timestamp DESC, id DESC");

    let records = builder
        .build_query_as::<EventRecord>()
        .fetch_all(pool)
        .await?;

    Ok(records)
}

pub async fn delete_event(pool: &Db, id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM events WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn count_events(pool: &Db, honeypot_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE honeypot_id = ?1")
        .bind(honeypot_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::honeypots::{insert_honeypot, NewHoneypot};
    use crate::persistence::migrations;

    async fn pool_with_honeypot() -> (Db, i64) {
        let pool = migrations::init_pool("sqlite::memory:").await.expect("pool");
        migrations::run_migrations(&pool).await.expect("migrations");

        let mut tx = pool.begin().await.expect("begin");
        let id = insert_honeypot(
            &mut tx,
            NewHoneypot {
                name: "sensor".to_string(),
                kind: "ssh".to_string(),
                host: "0.0.0.0".to_string(),
                port: 2222,
                status: "active".to_string(),
                container_id: None,
                container_name: None,
            },
        )
        .await
        .expect("insert honeypot");
        tx.commit().await.expect("commit");
        (pool, id)
    }

    async fn add_event(pool: &Db, honeypot_id: i64, ip: &str, event_type: &str) -> EventRecord {
        let mut tx = pool.begin().await.expect("begin");
        let record = insert_event(
            &mut tx,
            NewEvent {
                honeypot_id,
                ip_address: ip.to_string(),
                event_type: event_type.to_string(),
                details: Some(format!("{event_type} from {ip}")),
            },
        )
        .await
        .expect("insert event");
        tx.commit().await.expect("commit");
        record
    }

    #[tokio::test]
    async fn honeypot_exists_matches_reality() {
        let (pool, id) = pool_with_honeypot().await;
        let mut conn = pool.acquire().await.expect("acquire");
        assert!(honeypot_exists(&mut conn, id).await.expect("check"));
        assert!(!honeypot_exists(&mut conn, id + 100).await.expect("check"));
    }

    #[tokio::test]
    async fn filters_narrow_the_listing() {
        let (pool, id) = pool_with_honeypot().await;
        add_event(&pool, id, "10.0.0.1", "brute_force").await;
        add_event(&pool, id, "10.0.0.2", "port_scan").await;
        add_event(&pool, id, "10.0.0.1", "port_scan").await;

        let all = list_events(&pool, EventFilters::default()).await.expect("list");
        assert_eq!(all.len(), 3);

        let by_ip = list_events(
            &pool,
            EventFilters {
                ip_address: Some("10.0.0.1".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("list");
        assert_eq!(by_ip.len(), 2);

        let combined = list_events(
            &pool,
            EventFilters {
                honeypot_id: Some(id),
                ip_address: Some("10.0.0.1".to_string()),
                event_type: Some("port_scan".to_string()),
            },
        )
        .await
        .expect("list");
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].event_type, "port_scan");
    }

    #[tokio::test]
    async fn listing_orders_newest_first() {
        let (pool, id) = pool_with_honeypot().await;
        let first = add_event(&pool, id, "10.0.0.1", "brute_force").await;
        let second = add_event(&pool, id, "10.0.0.2", "port_scan").await;

        let listed = list_events(&pool, EventFilters::default()).await.expect("list");
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn deleting_honeypot_cascades_to_events() {
        let (pool, id) = pool_with_honeypot().await;
        add_event(&pool, id, "10.0.0.1", "brute_force").await;
        assert_eq!(count_events(&pool, id).await.expect("count"), 1);

        crate::persistence::honeypots::delete_honeypot(&pool, id)
            .await
            .expect("delete");
        assert_eq!(count_events(&pool, id).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn delete_event_reports_rows_affected() {
        let (pool, id) = pool_with_honeypot().await;
        let record = add_event(&pool, id, "10.0.0.1", "other").await;

        assert_eq!(delete_event(&pool, record.id).await.expect("delete"), 1);
        assert_eq!(delete_event(&pool, record.id).await.expect("delete"), 0);
        assert!(get_event(&pool, record.id).await.expect("get").is_none());
    }
}
