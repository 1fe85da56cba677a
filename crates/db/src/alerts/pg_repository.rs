use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::alerts::models::SyncFailureAlert;
use crate::alerts::repositories::SyncFailureAlertRepository;
use haven_common::error::{HavenError, HavenResult};

const COLS: &str = "id, connection, consecutive_failures, last_failure_at, last_alerted_at, \
     acknowledged_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgSyncFailureAlertRepository {
    pool: PgPool,
}

impl PgSyncFailureAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> HavenResult<SyncFailureAlert> {
        Ok(SyncFailureAlert {
            id: row.get("id"),
            connection: row.get("connection"),
            consecutive_failures: row.get("consecutive_failures"),
            last_failure_at: row.get("last_failure_at"),
            last_alerted_at: row.get("last_alerted_at"),
            acknowledged_at: row.get("acknowledged_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SyncFailureAlertRepository for PgSyncFailureAlertRepository {
    async fn get_or_create(&self, connection: &str) -> HavenResult<SyncFailureAlert> {
        let row = sqlx::query(&format!(
            "insert into sync_failure_alerts (id, connection)
             values ($1, $2)
             on conflict (connection) do update set updated_at = now()
             returning {COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(connection)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn record_failure(&self, connection: &str) -> HavenResult<SyncFailureAlert> {
        self.get_or_create(connection).await?;

        let row = sqlx::query(&format!(
            "update sync_failure_alerts
             set consecutive_failures = consecutive_failures + 1,
                 last_failure_at = $1,
                 acknowledged_at = null,
                 updated_at = $1
             where connection = $2
             returning {COLS}"
        ))
        .bind(Utc::now())
        .bind(connection)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn record_success(&self, connection: &str) -> HavenResult<()> {
        self.get_or_create(connection).await?;

        sqlx::query(
            "update sync_failure_alerts
             set consecutive_failures = 0, updated_at = $1
             where connection = $2",
        )
        .bind(Utc::now())
        .bind(connection)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_alerted(&self, connection: &str) -> HavenResult<()> {
        let result = sqlx::query(
            "update sync_failure_alerts set last_alerted_at = $1, updated_at = $1
             where connection = $2",
        )
        .bind(Utc::now())
        .bind(connection)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(HavenError::NotFound(format!(
                "no alert row for connection {connection}"
            )));
        }
        Ok(())
    }

    async fn acknowledge(&self, connection: &str) -> HavenResult<()> {
        let result = sqlx::query(
            "update sync_failure_alerts set acknowledged_at = $1, updated_at = $1
             where connection = $2",
        )
        .bind(Utc::now())
        .bind(connection)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(HavenError::NotFound(format!(
                "no alert row for connection {connection}"
            )));
        }
        Ok(())
    }
}
