use haven_db::vendors::models::Vendor;

use crate::trace::ScorerResult;

use super::Scorer;

/// Digits only, keeping the last 10 so "+1 (555) 010-0199" and
/// "555-010-0199" compare equal.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        digits
    }
}

pub struct PhoneExactScorer {
    pub weight: f64,
}

impl Scorer for PhoneExactScorer {
    fn name(&self) -> &'static str {
        "phone_exact"
    }

    fn score(&self, a: &Vendor, b: &Vendor) -> ScorerResult {
        let score = match (&a.phone, &b.phone) {
            (Some(pa), Some(pb)) => {
                let na = normalize_phone(pa);
                let nb = normalize_phone(pb);
                if !na.is_empty() && na == nb {
                    1.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        ScorerResult {
            rule: self.name().to_string(),
            score,
            weight: self.weight,
            weighted_score: score * self.weight,
            detail: format!("a={:?} b={:?}", a.phone, b.phone),
        }
    }
}
