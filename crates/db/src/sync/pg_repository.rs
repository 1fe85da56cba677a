use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::sync::models::{SyncMode, SyncRun, SyncRunMetadata, SyncStatus};
use crate::sync::repositories::SyncRunRepository;
use haven_common::error::{HavenError, HavenResult};

const RETURNING: &str = "id, mode, status, started_at, finished_at, total_resources, \
     total_errors, error_summary, metadata, created_at, updated_at";

#[derive(Clone)]
pub struct PgSyncRunRepository {
    pool: PgPool,
}

impl PgSyncRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> HavenResult<SyncRun> {
        let mode_raw: String = row.get("mode");
        let status_raw: String = row.get("status");
        let metadata_raw: serde_json::Value = row.get("metadata");

        Ok(SyncRun {
            id: row.get("id"),
            mode: SyncMode::from_str(&mode_raw).map_err(HavenError::Internal)?,
            status: SyncStatus::from_str(&status_raw).map_err(HavenError::Internal)?,
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            total_resources: row.get("total_resources"),
            total_errors: row.get("total_errors"),
            error_summary: row.get("error_summary"),
            metadata: serde_json::from_value(metadata_raw)
                .map_err(|e| HavenError::Internal(format!("bad run metadata: {e}")))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn metadata_value(metadata: &SyncRunMetadata) -> HavenResult<serde_json::Value> {
        serde_json::to_value(metadata)
            .map_err(|e| HavenError::Internal(format!("serialize run metadata: {e}")))
    }
}

#[async_trait]
impl SyncRunRepository for PgSyncRunRepository {
    async fn create(&self, mode: SyncMode) -> HavenResult<SyncRun> {
        let row = sqlx::query(&format!(
            "insert into sync_runs (id, mode, status, metadata)
             values ($1, $2, 'pending', '{{}}'::jsonb)
             returning {RETURNING}"
        ))
        .bind(Uuid::new_v4())
        .bind(mode.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn get(&self, id: Uuid) -> HavenResult<Option<SyncRun>> {
        let row = sqlx::query(&format!("select {RETURNING} from sync_runs where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn find_active_within(&self, window: Duration) -> HavenResult<Option<SyncRun>> {
        let cutoff = Utc::now() - window;
        let row = sqlx::query(&format!(
            "select {RETURNING} from sync_runs
             where status = 'running' and started_at >= $1
             order by started_at desc
             limit 1"
        ))
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn find_last_completed(&self) -> HavenResult<Option<SyncRun>> {
        let row = sqlx::query(&format!(
            "select {RETURNING} from sync_runs
             where status = 'completed'
             order by started_at desc
             limit 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn mark_running(&self, id: Uuid) -> HavenResult<SyncRun> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "update sync_runs
             set status = 'running', started_at = $1, updated_at = $1
             where id = $2 and status = 'pending'
             returning {RETURNING}"
        ))
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(HavenError::Validation(format!(
                "run {id} is not pending, refusing to start"
            ))),
        }
    }

    async fn save_metadata(&self, id: Uuid, metadata: &SyncRunMetadata) -> HavenResult<()> {
        let result = sqlx::query(
            "update sync_runs set metadata = $1, updated_at = $2
             where id = $3 and status = 'running'",
        )
        .bind(Self::metadata_value(metadata)?)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(HavenError::Validation(format!("run {id} is not running")));
        }
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        total_resources: i64,
        metadata: &SyncRunMetadata,
    ) -> HavenResult<SyncRun> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "update sync_runs
             set status = 'completed', finished_at = $1, total_resources = $2,
                 total_errors = $3, metadata = $4, updated_at = $1
             where id = $5 and status = 'running'
             returning {RETURNING}"
        ))
        .bind(now)
        .bind(total_resources)
        .bind(metadata.total_errors() as i64)
        .bind(Self::metadata_value(metadata)?)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(HavenError::Validation(format!(
                "run {id} is not running, cannot complete"
            ))),
        }
    }

    async fn fail(
        &self,
        id: Uuid,
        summary: &str,
        total_errors: i64,
        metadata: &SyncRunMetadata,
    ) -> HavenResult<SyncRun> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "update sync_runs
             set status = 'failed', finished_at = $1, error_summary = $2,
                 total_errors = $3, metadata = $4, updated_at = $1
             where id = $5 and status = 'running'
             returning {RETURNING}"
        ))
        .bind(now)
        .bind(summary)
        .bind(total_errors)
        .bind(Self::metadata_value(metadata)?)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(HavenError::Validation(format!(
                "run {id} is not running, cannot fail"
            ))),
        }
    }
}
