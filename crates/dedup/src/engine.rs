use serde::{Deserialize, Serialize};
use uuid::Uuid;

use haven_db::vendors::models::Vendor;

use crate::config::DedupConfig;
use crate::scorers::email::EmailExactScorer;
use crate::scorers::name::NameSimilarityScorer;
use crate::scorers::phone::PhoneExactScorer;
use crate::scorers::Scorer;
use crate::trace::{MatchTrace, ScorerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub vendor_a_id: Uuid,
    pub vendor_b_id: Uuid,
    pub vendor_a_external_id: i64,
    pub vendor_b_external_id: i64,
    pub vendor_a_name: String,
    pub vendor_b_name: String,
    pub score: f64,
    pub reasons: Vec<String>,
    pub trace: MatchTrace,
}

#[derive(Debug, Clone)]
pub struct PairScore {
    pub score: f64,
    pub trace: MatchTrace,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub candidates: Vec<DuplicateCandidate>,
    pub vendors_scanned: usize,
    pub comparisons_made: usize,
}

/// Composite similarity of two vendor records in [0, 1].
pub fn score_pair(config: &DedupConfig, a: &Vendor, b: &Vendor) -> PairScore {
    let scorers: Vec<Box<dyn Scorer>> = vec![
        Box::new(NameSimilarityScorer {
            weight: config.weights.name_similarity,
        }),
        Box::new(PhoneExactScorer {
            weight: config.weights.phone_exact,
        }),
        Box::new(EmailExactScorer {
            weight: config.weights.email_exact,
        }),
    ];

    let results: Vec<ScorerResult> = scorers.iter().map(|s| s.score(a, b)).collect();

    let raw_total: f64 = results.iter().map(|r| r.weighted_score).sum();
    let weight_sum: f64 = results.iter().map(|r| r.weight).sum();

    let score = if weight_sum > 0.0 {
        (raw_total / weight_sum).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let trace = MatchTrace {
        scorers: results,
        raw_total,
        weight_sum,
        score,
    };

    PairScore { score, trace }
}

pub fn candidate_from_pair(a: &Vendor, b: &Vendor, pair: PairScore) -> DuplicateCandidate {
    DuplicateCandidate {
        vendor_a_id: a.id,
        vendor_b_id: b.id,
        vendor_a_external_id: a.external_id,
        vendor_b_external_id: b.external_id,
        vendor_a_name: a.name.clone(),
        vendor_b_name: b.name.clone(),
        score: pair.score,
        reasons: pair.trace.reasons(),
        trace: pair.trace,
    }
}

/// Descending by score, stable tie-break on external ids so an unchanged
/// vendor set always ranks identically; capped at `limit`.
pub fn rank(mut candidates: Vec<DuplicateCandidate>, limit: usize) -> Vec<DuplicateCandidate> {
    candidates.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.vendor_a_external_id.cmp(&y.vendor_a_external_id))
            .then_with(|| x.vendor_b_external_id.cmp(&y.vendor_b_external_id))
    });
    candidates.truncate(limit);
    candidates
}

/// Pairwise scan over canonical vendors. Vendors already linked as
/// duplicates are excluded; their canonical row represents them.
pub fn find_potential_duplicates(
    config: &DedupConfig,
    vendors: &[Vendor],
    threshold: f64,
    limit: usize,
) -> ScanOutcome {
    let mut pool: Vec<&Vendor> = vendors.iter().filter(|v| v.is_canonical()).collect();
    pool.sort_by_key(|v| v.external_id);

    let mut candidates = Vec::new();
    let mut comparisons = 0usize;

    for i in 0..pool.len() {
        for j in (i + 1)..pool.len() {
            comparisons += 1;
            let pair = score_pair(config, pool[i], pool[j]);
            if pair.score >= threshold {
                candidates.push(candidate_from_pair(pool[i], pool[j], pair));
            }
        }
    }

    ScanOutcome {
        candidates: rank(candidates, limit),
        vendors_scanned: pool.len(),
        comparisons_made: comparisons,
    }
}
