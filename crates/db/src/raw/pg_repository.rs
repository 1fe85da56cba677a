use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::raw::models::RawEvent;
use crate::raw::repositories::RawEventRepository;
use haven_common::error::{HavenError, HavenResult};
use haven_common::types::ResourceType;

#[derive(Clone)]
pub struct PgRawEventRepository {
    pool: PgPool,
}

impl PgRawEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> HavenResult<RawEvent> {
        let resource_raw: String = row.get("resource_type");
        Ok(RawEvent {
            id: row.get("id"),
            sync_run_id: row.get("sync_run_id"),
            resource_type: ResourceType::from_str(&resource_raw).map_err(HavenError::Internal)?,
            external_id: row.get("external_id"),
            payload: row.get("payload"),
            pulled_at: row.get("pulled_at"),
            processed_at: row.get("processed_at"),
        })
    }
}

#[async_trait]
impl RawEventRepository for PgRawEventRepository {
    async fn capture(
        &self,
        sync_run_id: Uuid,
        resource_type: ResourceType,
        external_id: &str,
        payload: &serde_json::Value,
    ) -> HavenResult<RawEvent> {
        let row = sqlx::query(
            "insert into raw_events (id, sync_run_id, resource_type, external_id, payload, pulled_at)
             values ($1, $2, $3, $4, $5, $6)
             returning id, sync_run_id, resource_type, external_id, payload, pulled_at, processed_at",
        )
        .bind(Uuid::new_v4())
        .bind(sync_run_id)
        .bind(resource_type.as_str())
        .bind(external_id)
        .bind(payload)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn unprocessed(
        &self,
        resource_type: ResourceType,
        limit: i64,
    ) -> HavenResult<Vec<RawEvent>> {
        let rows = sqlx::query(
            "select id, sync_run_id, resource_type, external_id, payload, pulled_at, processed_at
             from raw_events
             where resource_type = $1 and processed_at is null
             order by pulled_at asc
             limit $2",
        )
        .bind(resource_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn mark_processed(&self, id: Uuid) -> HavenResult<()> {
        let result = sqlx::query(
            "update raw_events set processed_at = $1
             where id = $2 and processed_at is null",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(HavenError::Validation(format!(
                "raw event {id} missing or already processed"
            )));
        }
        Ok(())
    }
}
