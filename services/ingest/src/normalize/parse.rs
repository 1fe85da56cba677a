use chrono::NaiveDate;

/// Parse a currency string into integer cents.
///
/// The API sends amounts as strings: "$1,234.56", "1234.5", "(45.00)" for
/// negatives, or plain integers. Returns `None` for anything that does not
/// parse; callers decide whether that skips the record.
pub fn parse_money_cents(raw: &str) -> Option<i64> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = &s[1..s.len() - 1];
    }

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let mut cleaned = cleaned.as_str();
    if let Some(rest) = cleaned.strip_prefix('-') {
        negative = !negative;
        cleaned = rest;
    }
    if cleaned.is_empty() {
        return None;
    }

    let (dollars_part, cents_part) = match cleaned.split_once('.') {
        Some((d, c)) => (d, c),
        None => (cleaned, ""),
    };

    let dollars: i64 = if dollars_part.is_empty() {
        0
    } else {
        dollars_part.parse().ok()?
    };

    let cents: i64 = match cents_part.len() {
        0 => 0,
        1 => cents_part.parse::<i64>().ok()? * 10,
        2 => cents_part.parse().ok()?,
        // More than two fraction digits is not money
        _ => return None,
    };

    let total = dollars.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -total } else { total })
}

/// Parse a date string in the formats the API actually emits.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

/// String field accessor tolerating missing keys and nulls.
pub fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str()).map(str::trim).filter(|s| !s.is_empty())
}

/// Integer field accessor; source ids are numbers but occasionally arrive
/// as numeric strings.
pub fn i64_field(value: &serde_json::Value, key: &str) -> Option<i64> {
    match value.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn bool_field(value: &serde_json::Value, key: &str) -> Option<bool> {
    value.get(key).and_then(|v| v.as_bool())
}
