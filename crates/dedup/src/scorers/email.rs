use haven_db::vendors::models::Vendor;

use crate::trace::ScorerResult;

use super::Scorer;

pub struct EmailExactScorer {
    pub weight: f64,
}

impl Scorer for EmailExactScorer {
    fn name(&self) -> &'static str {
        "email_exact"
    }

    fn score(&self, a: &Vendor, b: &Vendor) -> ScorerResult {
        let score = match (&a.email, &b.email) {
            (Some(ea), Some(eb)) => {
                let ea = ea.trim().to_lowercase();
                let eb = eb.trim().to_lowercase();
                if !ea.is_empty() && ea == eb {
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
            detail: format!("a={:?} b={:?}", a.email, b.email),
        }
    }
}
