use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use haven_common::error::HavenResult;
use haven_common::types::UpsertOutcome;
use haven_db::utilities::models::{NewUtilityExpense, ReprocessStats};
use haven_db::utilities::repositories::UtilitiesRepository;

/// Classification of one bill detail under the current GL mappings.
#[derive(Debug)]
pub enum Derivation {
    Mapped(NewUtilityExpense),
    /// The bill carries no GL account; nothing to classify against.
    NoGlAccount,
    /// The GL account exists but no mapping covers it.
    Unmapped,
}

pub fn derive_expense(
    bill_detail_id: Uuid,
    property_external_id: Option<i64>,
    gl_account_number: Option<&str>,
    amount_cents: i64,
    expense_date: NaiveDate,
    mappings: &HashMap<String, String>,
) -> Derivation {
    let Some(gl) = gl_account_number else {
        return Derivation::NoGlAccount;
    };
    match mappings.get(gl) {
        Some(utility_type) => Derivation::Mapped(NewUtilityExpense {
            bill_detail_id,
            property_external_id,
            utility_type: utility_type.clone(),
            amount_cents,
            expense_date,
        }),
        None => Derivation::Unmapped,
    }
}

/// Recompute derived utility expenses from the immutable bill-detail rows.
///
/// Runs when a GL-account mapping changes: previously derived expenses in
/// the date range are deleted and recreated under the current mappings. The
/// bill details themselves are never touched, so the result is fully
/// re-derivable — the same bills and mappings always produce the same
/// expense set.
pub async fn reprocess_all(
    utilities: &dyn UtilitiesRepository,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> HavenResult<ReprocessStats> {
    let mappings: HashMap<String, String> = utilities
        .active_mappings()
        .await?
        .into_iter()
        .map(|m| (m.gl_account_number, m.utility_type))
        .collect();

    let deleted = utilities.delete_expenses_in_range(from, to).await?;
    tracing::info!(deleted, "cleared derived expenses in range");

    let bills = utilities.bill_details_in_range(from, to).await?;
    let mut stats = ReprocessStats::default();

    for bill in &bills {
        match derive_expense(
            bill.id,
            bill.property_external_id,
            bill.gl_account_number.as_deref(),
            bill.amount_cents,
            bill.bill_date,
            &mappings,
        ) {
            Derivation::Mapped(expense) => match utilities.upsert_expense(expense).await {
                Ok(UpsertOutcome::Created) => stats.created += 1,
                Ok(UpsertOutcome::Updated) => stats.updated += 1,
                Ok(UpsertOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        bill_detail = bill.external_id,
                        error = %e,
                        "failed to write derived expense"
                    );
                    stats.errors += 1;
                }
            },
            Derivation::NoGlAccount => stats.skipped += 1,
            Derivation::Unmapped => stats.unmatched += 1,
        }
    }

    tracing::info!(
        created = stats.created,
        updated = stats.updated,
        skipped = stats.skipped,
        unmatched = stats.unmatched,
        errors = stats.errors,
        "reprocess finished"
    );
    Ok(stats)
}
