use uuid::Uuid;

use haven_db::portfolio::models::{
    NewLease, NewLedgerTransaction, NewProperty, NewTenant, NewUnit, NewWorkOrder,
};

use super::parse::{i64_field, parse_date, parse_money_cents, str_field};
use super::NormalizeError;

fn required_i64(payload: &serde_json::Value, field: &'static str) -> Result<i64, NormalizeError> {
    i64_field(payload, field).ok_or(NormalizeError::MissingField(field))
}

fn required_str<'a>(
    payload: &'a serde_json::Value,
    field: &'static str,
) -> Result<&'a str, NormalizeError> {
    str_field(payload, field).ok_or(NormalizeError::MissingField(field))
}

fn required_money(payload: &serde_json::Value, field: &'static str) -> Result<i64, NormalizeError> {
    let raw = required_str(payload, field)?;
    parse_money_cents(raw).ok_or_else(|| NormalizeError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

fn optional_money(
    payload: &serde_json::Value,
    field: &'static str,
) -> Result<Option<i64>, NormalizeError> {
    match str_field(payload, field) {
        Some(raw) => parse_money_cents(raw)
            .map(Some)
            .ok_or_else(|| NormalizeError::InvalidValue {
                field,
                value: raw.to_string(),
            }),
        None => Ok(None),
    }
}

fn required_date(
    payload: &serde_json::Value,
    field: &'static str,
) -> Result<chrono::NaiveDate, NormalizeError> {
    let raw = required_str(payload, field)?;
    parse_date(raw).ok_or_else(|| NormalizeError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

fn optional_date(
    payload: &serde_json::Value,
    field: &'static str,
) -> Result<Option<chrono::NaiveDate>, NormalizeError> {
    match str_field(payload, field) {
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| NormalizeError::InvalidValue {
                field,
                value: raw.to_string(),
            }),
        None => Ok(None),
    }
}

pub fn map_property(payload: &serde_json::Value) -> Result<NewProperty, NormalizeError> {
    Ok(NewProperty {
        external_id: required_i64(payload, "property_id")?,
        name: required_str(payload, "name")?.to_string(),
        address_line1: str_field(payload, "address").map(str::to_string),
        city: str_field(payload, "city").map(str::to_string),
        state: str_field(payload, "state").map(str::to_string),
        postal_code: str_field(payload, "postal_code").map(str::to_string),
        property_type: str_field(payload, "property_type").map(str::to_string),
        raw_ref: Some(payload.clone()),
    })
}

pub fn map_unit(payload: &serde_json::Value, property_id: Uuid) -> Result<NewUnit, NormalizeError> {
    Ok(NewUnit {
        external_id: required_i64(payload, "unit_id")?,
        property_id,
        unit_number: required_str(payload, "unit_name")?.to_string(),
        bedrooms: i64_field(payload, "bedrooms").map(|n| n as i16),
        bathrooms: str_field(payload, "bathrooms").and_then(|s| s.parse().ok()),
        square_feet: i64_field(payload, "square_feet").map(|n| n as i32),
        market_rent_cents: optional_money(payload, "market_rent")?,
        raw_ref: Some(payload.clone()),
    })
}

pub fn map_tenant(payload: &serde_json::Value) -> Result<NewTenant, NormalizeError> {
    Ok(NewTenant {
        external_id: required_i64(payload, "tenant_id")?,
        first_name: required_str(payload, "first_name")?.to_string(),
        last_name: required_str(payload, "last_name")?.to_string(),
        email: str_field(payload, "email").map(str::to_string),
        phone: str_field(payload, "phone").map(str::to_string),
        status: str_field(payload, "status").unwrap_or("current").to_string(),
        raw_ref: Some(payload.clone()),
    })
}

pub fn map_lease(
    payload: &serde_json::Value,
    unit_id: Uuid,
    tenant_id: Uuid,
) -> Result<NewLease, NormalizeError> {
    Ok(NewLease {
        external_id: required_i64(payload, "lease_id")?,
        unit_id,
        tenant_id,
        rent_cents: required_money(payload, "rent")?,
        deposit_cents: optional_money(payload, "deposit")?,
        start_date: required_date(payload, "lease_from")?,
        end_date: optional_date(payload, "lease_to")?,
        status: str_field(payload, "status").unwrap_or("active").to_string(),
        raw_ref: Some(payload.clone()),
    })
}

pub fn map_ledger_transaction(
    payload: &serde_json::Value,
    lease_id: Option<Uuid>,
    property_id: Option<Uuid>,
) -> Result<NewLedgerTransaction, NormalizeError> {
    Ok(NewLedgerTransaction {
        external_id: required_i64(payload, "gl_transaction_id")?,
        lease_id,
        property_id,
        gl_account_number: str_field(payload, "gl_account_number").map(str::to_string),
        description: str_field(payload, "description").map(str::to_string),
        amount_cents: required_money(payload, "amount")?,
        transaction_date: required_date(payload, "post_date")?,
        transaction_type: str_field(payload, "transaction_type").map(str::to_string),
        raw_ref: Some(payload.clone()),
    })
}

pub fn map_work_order(
    payload: &serde_json::Value,
    property_id: Uuid,
    unit_id: Option<Uuid>,
    vendor_id: Option<Uuid>,
) -> Result<NewWorkOrder, NormalizeError> {
    Ok(NewWorkOrder {
        external_id: required_i64(payload, "work_order_id")?,
        property_id,
        unit_id,
        vendor_id,
        description: str_field(payload, "description").map(str::to_string),
        status: str_field(payload, "status").unwrap_or("open").to_string(),
        priority: str_field(payload, "priority").map(str::to_string),
        opened_on: optional_date(payload, "created_date")?,
        completed_on: optional_date(payload, "completed_date")?,
        raw_ref: Some(payload.clone()),
    })
}

/// Delinquency rows carry the tenant id, the receivable balance and an
/// as-of date; they land on the tenant record.
pub struct DelinquencyFields {
    pub tenant_external_id: i64,
    pub amount_cents: i64,
    pub as_of: chrono::NaiveDate,
}

pub fn map_delinquency(payload: &serde_json::Value) -> Result<DelinquencyFields, NormalizeError> {
    Ok(DelinquencyFields {
        tenant_external_id: required_i64(payload, "tenant_id")?,
        amount_cents: required_money(payload, "amount_receivable")?,
        as_of: required_date(payload, "as_of")?,
    })
}
