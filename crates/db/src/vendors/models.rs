use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Uuid,
    pub external_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub is_active: bool,
    /// Non-null means this vendor is a duplicate of the referenced canonical
    /// vendor. Links are always depth 1: the target of a link is itself
    /// never a duplicate.
    pub canonical_vendor_id: Option<Uuid>,
    pub raw_ref: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vendor {
    pub fn is_canonical(&self) -> bool {
        self.canonical_vendor_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVendor {
    pub external_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub is_active: bool,
    pub raw_ref: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown analysis status: {value}")),
        }
    }
}

/// One background pass over the vendor set looking for duplicates.
/// Pairwise comparison is O(n²), so it runs as a job with progress
/// counters instead of inside an interactive request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorDuplicateAnalysis {
    pub id: Uuid,
    pub status: AnalysisStatus,
    pub threshold: f64,
    pub vendors_scanned: i64,
    pub comparisons_made: i64,
    pub duplicates_found: i64,
    pub results: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
