use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// GL-account-number → utility-type association. Changing one of these
/// invalidates previously derived expenses for that account, which is what
/// reclassification recomputes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityAccountMapping {
    pub id: Uuid,
    pub gl_account_number: String,
    pub utility_type: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable source rows pulled from the bill-detail report. Never mutated
/// by reclassification; expenses are re-derivable from these alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillDetail {
    pub id: Uuid,
    pub external_id: i64,
    pub vendor_external_id: Option<i64>,
    pub property_external_id: Option<i64>,
    pub gl_account_number: Option<String>,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub bill_date: NaiveDate,
    pub raw_ref: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBillDetail {
    pub external_id: i64,
    pub vendor_external_id: Option<i64>,
    pub property_external_id: Option<i64>,
    pub gl_account_number: Option<String>,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub bill_date: NaiveDate,
    pub raw_ref: Option<serde_json::Value>,
}

/// Derived classification of a bill detail; at most one per bill detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUtilityExpense {
    pub bill_detail_id: Uuid,
    pub property_external_id: Option<i64>,
    pub utility_type: String,
    pub amount_cents: i64,
    pub expense_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReprocessStats {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub unmatched: u64,
    pub errors: u64,
}
