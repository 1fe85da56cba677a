use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upsert inputs for the portfolio entities. Each carries the source
/// system's integer id as its natural key; local identity is a surrogate
/// uuid assigned on first insert. Money is integer cents throughout.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProperty {
    pub external_id: i64,
    pub name: String,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub property_type: Option<String>,
    pub raw_ref: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUnit {
    pub external_id: i64,
    pub property_id: Uuid,
    pub unit_number: String,
    pub bedrooms: Option<i16>,
    pub bathrooms: Option<f32>,
    pub square_feet: Option<i32>,
    pub market_rent_cents: Option<i64>,
    pub raw_ref: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTenant {
    pub external_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub raw_ref: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLease {
    pub external_id: i64,
    pub unit_id: Uuid,
    pub tenant_id: Uuid,
    pub rent_cents: i64,
    pub deposit_cents: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub raw_ref: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerTransaction {
    pub external_id: i64,
    pub lease_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub gl_account_number: Option<String>,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub transaction_date: NaiveDate,
    pub transaction_type: Option<String>,
    pub raw_ref: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkOrder {
    pub external_id: i64,
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub description: Option<String>,
    pub status: String,
    pub priority: Option<String>,
    pub opened_on: Option<NaiveDate>,
    pub completed_on: Option<NaiveDate>,
    pub raw_ref: Option<serde_json::Value>,
}
