use haven_db::utilities::models::NewBillDetail;

use super::parse::{i64_field, parse_date, parse_money_cents, str_field};
use super::NormalizeError;

pub fn map_bill_detail(payload: &serde_json::Value) -> Result<NewBillDetail, NormalizeError> {
    let external_id = i64_field(payload, "bill_detail_id")
        .ok_or(NormalizeError::MissingField("bill_detail_id"))?;

    let amount_raw =
        str_field(payload, "amount").ok_or(NormalizeError::MissingField("amount"))?;
    let amount_cents =
        parse_money_cents(amount_raw).ok_or_else(|| NormalizeError::InvalidValue {
            field: "amount",
            value: amount_raw.to_string(),
        })?;

    let date_raw =
        str_field(payload, "bill_date").ok_or(NormalizeError::MissingField("bill_date"))?;
    let bill_date = parse_date(date_raw).ok_or_else(|| NormalizeError::InvalidValue {
        field: "bill_date",
        value: date_raw.to_string(),
    })?;

    Ok(NewBillDetail {
        external_id,
        vendor_external_id: i64_field(payload, "vendor_id"),
        property_external_id: i64_field(payload, "property_id"),
        gl_account_number: str_field(payload, "gl_account_number").map(str::to_string),
        description: str_field(payload, "description").map(str::to_string),
        amount_cents,
        bill_date,
        raw_ref: Some(payload.clone()),
    })
}
