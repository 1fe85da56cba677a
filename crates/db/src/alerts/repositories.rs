use async_trait::async_trait;

use crate::alerts::models::SyncFailureAlert;
use haven_common::error::HavenResult;

#[async_trait]
pub trait SyncFailureAlertRepository: Send + Sync {
    async fn get_or_create(&self, connection: &str) -> HavenResult<SyncFailureAlert>;

    /// Increment the consecutive-failure counter and clear any prior
    /// acknowledgment.
    async fn record_failure(&self, connection: &str) -> HavenResult<SyncFailureAlert>;

    /// Reset the counter after a successful run.
    async fn record_success(&self, connection: &str) -> HavenResult<()>;

    /// Stamp `last_alerted_at` after a notification was sent.
    async fn mark_alerted(&self, connection: &str) -> HavenResult<()>;

    /// Human acknowledgment; silences alerting until the next failure.
    async fn acknowledge(&self, connection: &str) -> HavenResult<()>;
}
