use async_trait::async_trait;
use uuid::Uuid;

use crate::raw::models::RawEvent;
use haven_common::error::HavenResult;
use haven_common::types::ResourceType;

#[async_trait]
pub trait RawEventRepository: Send + Sync {
    /// Durably persist a fetched payload before normalization is attempted.
    async fn capture(
        &self,
        sync_run_id: Uuid,
        resource_type: ResourceType,
        external_id: &str,
        payload: &serde_json::Value,
    ) -> HavenResult<RawEvent>;

    /// Events not yet consumed by normalization, oldest first.
    async fn unprocessed(
        &self,
        resource_type: ResourceType,
        limit: i64,
    ) -> HavenResult<Vec<RawEvent>>;

    /// Stamp `processed_at`. The only mutation path; fails if the event was
    /// already processed so the exactly-once invariant is enforced here.
    async fn mark_processed(&self, id: Uuid) -> HavenResult<()>;
}
