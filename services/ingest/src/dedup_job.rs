use std::sync::Arc;

use haven_common::error::{HavenError, HavenResult};
use haven_db::vendors::models::VendorDuplicateAnalysis;
use haven_db::vendors::repositories::{VendorAnalysisRepository, VendorRepository};
use haven_dedup::engine::{candidate_from_pair, rank, score_pair, DuplicateCandidate};
use haven_dedup::DedupConfig;

/// Persist progress after this many outer-loop vendors.
const PROGRESS_EVERY: usize = 25;

/// Pairwise duplicate scan as a background job.
///
/// The scan only reads vendor state, so it can run alongside ingestion; it
/// writes solely to its own analysis row. Linked duplicates are excluded —
/// their canonical row represents them.
pub async fn run_duplicate_analysis(
    vendors: Arc<dyn VendorRepository>,
    analyses: Arc<dyn VendorAnalysisRepository>,
    config: &DedupConfig,
    threshold: f64,
    limit: usize,
) -> HavenResult<VendorDuplicateAnalysis> {
    let analysis = analyses.create(threshold).await?;
    let analysis = analyses.mark_processing(analysis.id).await?;
    tracing::info!(analysis = %analysis.id, threshold, limit, "starting duplicate analysis");

    let pool = match vendors.list_active().await {
        Ok(all) => {
            let mut pool: Vec<_> = all.into_iter().filter(|v| v.is_canonical()).collect();
            pool.sort_by_key(|v| v.external_id);
            pool
        }
        Err(e) => {
            let msg = e.to_string();
            tracing::error!(error = %msg, "vendor load failed");
            return analyses.fail(analysis.id, &msg).await;
        }
    };

    let mut candidates: Vec<DuplicateCandidate> = Vec::new();
    let mut comparisons = 0usize;

    for i in 0..pool.len() {
        for j in (i + 1)..pool.len() {
            comparisons += 1;
            let pair = score_pair(config, &pool[i], &pool[j]);
            if pair.score >= threshold {
                candidates.push(candidate_from_pair(&pool[i], &pool[j], pair));
            }
        }

        if (i + 1) % PROGRESS_EVERY == 0 {
            analyses
                .update_progress(
                    analysis.id,
                    (i + 1) as i64,
                    comparisons as i64,
                    candidates.len() as i64,
                )
                .await?;
        }
    }

    let vendors_scanned = pool.len();
    let ranked = rank(candidates, limit);

    analyses
        .update_progress(
            analysis.id,
            vendors_scanned as i64,
            comparisons as i64,
            ranked.len() as i64,
        )
        .await?;

    let results = serde_json::to_value(&ranked)
        .map_err(|e| HavenError::Internal(format!("serialize analysis results: {e}")))?;
    let done = analyses.complete(analysis.id, results).await?;

    tracing::info!(
        analysis = %done.id,
        vendors_scanned,
        comparisons,
        duplicates_found = ranked.len(),
        "duplicate analysis completed"
    );
    Ok(done)
}
