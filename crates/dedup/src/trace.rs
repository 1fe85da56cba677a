use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerResult {
    pub rule: String,
    pub score: f64,
    pub weight: f64,
    pub weighted_score: f64,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTrace {
    pub scorers: Vec<ScorerResult>,
    pub raw_total: f64,
    pub weight_sum: f64,
    pub score: f64,
}

impl MatchTrace {
    /// Rules that strongly contributed to the match; shown to reviewers as
    /// the reasons a pair was surfaced.
    pub fn reasons(&self) -> Vec<String> {
        self.scorers
            .iter()
            .filter(|s| s.score >= 0.85)
            .map(|s| s.rule.clone())
            .collect()
    }
}
