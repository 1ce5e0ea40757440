use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::cache::{PublicationBundle, Snapshot, SnapshotCache};
use crate::error::Result;

pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Snapshot cache backed by `newsletter_analytics.snapshots`. The newest row wins.
#[derive(Debug, Clone)]
pub struct PgSnapshotCache {
    pool: PgPool,
    keep: i64,
}

impl PgSnapshotCache {
    pub fn new(pool: PgPool, keep: i64) -> Self {
        Self {
            pool,
            keep: keep.max(1),
        }
    }

    /// Delete all but the newest `keep` snapshots.
    pub async fn prune(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM newsletter_analytics.snapshots
            WHERE id NOT IN (
                SELECT id FROM newsletter_analytics.snapshots
                ORDER BY fetched_at DESC
                LIMIT $1
            )
            "#,
        )
        .bind(self.keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

impl SnapshotCache for PgSnapshotCache {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            r#"
            SELECT fetched_at, fetch_duration_ms, publications
            FROM newsletter_analytics.snapshots
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let duration: i64 = row.get("fetch_duration_ms");
        let Json(publications): Json<Vec<PublicationBundle>> = row.try_get("publications")?;

        Ok(Some(Snapshot {
            fetched_at: row.get("fetched_at"),
            fetch_duration_ms: duration.max(0) as u64,
            publications,
        }))
    }

    async fn put(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO newsletter_analytics.snapshots
            (id, fetched_at, fetch_duration_ms, publications)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(snapshot.fetched_at)
        .bind(i64::try_from(snapshot.fetch_duration_ms).unwrap_or(i64::MAX))
        .bind(Json(&snapshot.publications))
        .execute(&self.pool)
        .await?;

        let pruned = self.prune().await?;
        if pruned > 0 {
            tracing::debug!(pruned, "old snapshots removed");
        }
        Ok(())
    }
}
