use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::sync::models::{SyncMode, SyncRun, SyncRunMetadata};
use haven_common::error::HavenResult;

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Create a new run in `pending` state.
    async fn create(&self, mode: SyncMode) -> HavenResult<SyncRun>;

    async fn get(&self, id: Uuid) -> HavenResult<Option<SyncRun>>;

    /// Find a `running` run whose start falls within the recency window.
    /// Used by the trigger path to refuse overlapping syncs.
    async fn find_active_within(&self, window: Duration) -> HavenResult<Option<SyncRun>>;

    /// Most recent `completed` run; its start time is the incremental cursor.
    async fn find_last_completed(&self) -> HavenResult<Option<SyncRun>>;

    /// Transition `pending` → `running`, stamping `started_at`.
    /// Fails if the run is not pending.
    async fn mark_running(&self, id: Uuid) -> HavenResult<SyncRun>;

    /// Persist in-progress metadata on a `running` run.
    async fn save_metadata(&self, id: Uuid, metadata: &SyncRunMetadata) -> HavenResult<()>;

    /// Transition `running` → `completed`. Fails if the run is not running;
    /// terminal runs are never mutated again.
    async fn complete(
        &self,
        id: Uuid,
        total_resources: i64,
        metadata: &SyncRunMetadata,
    ) -> HavenResult<SyncRun>;

    /// Transition `running` → `failed` with a human-readable summary.
    async fn fail(
        &self,
        id: Uuid,
        summary: &str,
        total_errors: i64,
        metadata: &SyncRunMetadata,
    ) -> HavenResult<SyncRun>;
}
