use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consecutive-failure counter for one external connection, with
/// rate-limited alerting. An acknowledgment silences alerting until the
/// next failure clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFailureAlert {
    pub id: Uuid,
    pub connection: String,
    pub consecutive_failures: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_alerted_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncFailureAlert {
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}
