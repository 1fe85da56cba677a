use haven_db::vendors::models::NewVendor;

use super::parse::{bool_field, i64_field, str_field};
use super::NormalizeError;

pub fn map_vendor(payload: &serde_json::Value) -> Result<NewVendor, NormalizeError> {
    let external_id =
        i64_field(payload, "vendor_id").ok_or(NormalizeError::MissingField("vendor_id"))?;
    let name = str_field(payload, "name")
        .ok_or(NormalizeError::MissingField("name"))?
        .to_string();

    Ok(NewVendor {
        external_id,
        name,
        phone: str_field(payload, "phone").map(str::to_string),
        email: str_field(payload, "email").map(str::to_string),
        address_line1: str_field(payload, "address").map(str::to_string),
        city: str_field(payload, "city").map(str::to_string),
        state: str_field(payload, "state").map(str::to_string),
        is_active: bool_field(payload, "is_active").unwrap_or(true),
        raw_ref: Some(payload.clone()),
    })
}
