use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerWeights {
    pub name_similarity: f64,
    pub phone_exact: f64,
    pub email_exact: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            name_similarity: 0.50,
            phone_exact: 0.30,
            email_exact: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub weights: ScorerWeights,
    /// Default similarity threshold for surfacing a candidate pair.
    pub default_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            weights: ScorerWeights::default(),
            default_threshold: 0.80,
        }
    }
}
