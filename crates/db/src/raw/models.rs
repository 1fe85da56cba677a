use chrono::{DateTime, Utc};
use haven_common::types::ResourceType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One payload fetched from the external API, captured before normalization.
///
/// `processed_at` is set exactly once, by the normalization step that
/// consumed the event, and never mutated afterward. Rows are retained
/// indefinitely for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Uuid,
    pub sync_run_id: Uuid,
    pub resource_type: ResourceType,
    pub external_id: String,
    pub payload: serde_json::Value,
    pub pulled_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
