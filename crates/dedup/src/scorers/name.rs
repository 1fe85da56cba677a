use haven_db::vendors::models::Vendor;

use crate::trace::ScorerResult;

use super::Scorer;

/// Suffixes that carry no identity: "Acme Plumbing LLC" and
/// "Acme Plumbing, Inc." are the same business.
const LEGAL_SUFFIXES: &[&str] = &["llc", "inc", "corp", "co", "ltd", "company", "incorporated"];

/// Lowercase, strip punctuation, drop trailing legal-form tokens.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while let Some(last) = tokens.last() {
        if LEGAL_SUFFIXES.contains(last) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}

pub struct NameSimilarityScorer {
    pub weight: f64,
}

impl Scorer for NameSimilarityScorer {
    fn name(&self) -> &'static str {
        "name_similarity"
    }

    fn score(&self, a: &Vendor, b: &Vendor) -> ScorerResult {
        let na = normalize_name(&a.name);
        let nb = normalize_name(&b.name);
        let score = if na.is_empty() || nb.is_empty() {
            0.0
        } else {
            strsim::jaro_winkler(&na, &nb)
        };

        ScorerResult {
            rule: self.name().to_string(),
            score,
            weight: self.weight,
            weighted_score: score * self.weight,
            detail: format!("a={na:?} b={nb:?}"),
        }
    }
}
