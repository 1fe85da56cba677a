use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use haven_common::types::ResourceType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-resource error entries retained in run metadata. Oldest dropped first.
pub const MAX_ERRORS_PER_RESOURCE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            _ => Err(format!("unknown sync mode: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown sync status: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    pub external_id: Option<String>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Typed metadata blob stored on a sync run.
///
/// Error lists are bounded: `push_error` keeps only the
/// `MAX_ERRORS_PER_RESOURCE` most recent entries per resource type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRunMetadata {
    #[serde(default)]
    pub resource_metrics: BTreeMap<String, ResourceMetrics>,
    #[serde(default)]
    pub resource_errors: BTreeMap<String, Vec<SyncErrorEntry>>,
}

impl SyncRunMetadata {
    pub fn metrics_mut(&mut self, resource: ResourceType) -> &mut ResourceMetrics {
        self.resource_metrics
            .entry(resource.as_str().to_string())
            .or_default()
    }

    pub fn metrics(&self, resource: ResourceType) -> ResourceMetrics {
        self.resource_metrics
            .get(resource.as_str())
            .copied()
            .unwrap_or_default()
    }

    pub fn push_error(&mut self, resource: ResourceType, entry: SyncErrorEntry) {
        let errors = self
            .resource_errors
            .entry(resource.as_str().to_string())
            .or_default();
        errors.push(entry);
        if errors.len() > MAX_ERRORS_PER_RESOURCE {
            let excess = errors.len() - MAX_ERRORS_PER_RESOURCE;
            errors.drain(..excess);
        }
    }

    /// Sum of created + updated across all resource types.
    pub fn total_synced(&self) -> u64 {
        self.resource_metrics
            .values()
            .map(|m| m.created + m.updated)
            .sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.resource_metrics.values().map(|m| m.errors).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub mode: SyncMode,
    pub status: SyncStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_resources: i64,
    pub total_errors: i64,
    pub error_summary: Option<String>,
    pub metadata: SyncRunMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> SyncErrorEntry {
        SyncErrorEntry {
            external_id: Some(n.to_string()),
            message: format!("error {n}"),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn push_error_caps_at_ten_most_recent() {
        let mut meta = SyncRunMetadata::default();
        for n in 0..15 {
            meta.push_error(ResourceType::Property, entry(n));
        }

        let errors = &meta.resource_errors["property"];
        assert_eq!(errors.len(), MAX_ERRORS_PER_RESOURCE);
        // Oldest (0..5) dropped; 5..15 retained in order
        assert_eq!(errors[0].external_id.as_deref(), Some("5"));
        assert_eq!(errors[9].external_id.as_deref(), Some("14"));
    }

    #[test]
    fn push_error_keeps_types_independent() {
        let mut meta = SyncRunMetadata::default();
        for n in 0..12 {
            meta.push_error(ResourceType::Property, entry(n));
        }
        meta.push_error(ResourceType::Unit, entry(99));

        assert_eq!(meta.resource_errors["property"].len(), 10);
        assert_eq!(meta.resource_errors["unit"].len(), 1);
    }

    #[test]
    fn totals_sum_across_resource_types() {
        let mut meta = SyncRunMetadata::default();
        let m = meta.metrics_mut(ResourceType::Property);
        m.created = 50;
        m.updated = 61;
        m.skipped = 1;
        m.errors = 1;
        let m = meta.metrics_mut(ResourceType::Unit);
        m.created = 10;

        assert_eq!(meta.total_synced(), 121);
        assert_eq!(meta.total_errors(), 1);
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let mut meta = SyncRunMetadata::default();
        meta.metrics_mut(ResourceType::Vendor).created = 3;
        meta.push_error(ResourceType::Vendor, entry(1));

        let value = serde_json::to_value(&meta).expect("serialize");
        let back: SyncRunMetadata = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back.metrics(ResourceType::Vendor).created, 3);
        assert_eq!(back.resource_errors["vendor"].len(), 1);
    }

    #[test]
    fn status_terminality() {
        assert!(!SyncStatus::Pending.is_terminal());
        assert!(!SyncStatus::Running.is_terminal());
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
    }

    #[test]
    fn mode_round_trips_through_str() {
        for mode in [SyncMode::Full, SyncMode::Incremental] {
            assert_eq!(mode.as_str().parse::<SyncMode>().unwrap(), mode);
        }
    }
}
