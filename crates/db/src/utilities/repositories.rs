use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::utilities::models::{
    BillDetail, NewBillDetail, NewUtilityExpense, UtilityAccountMapping,
};
use haven_common::error::HavenResult;
use haven_common::types::UpsertOutcome;

#[async_trait]
pub trait UtilitiesRepository: Send + Sync {
    async fn upsert_bill_detail(&self, bill: NewBillDetail) -> HavenResult<UpsertOutcome>;

    async fn bill_detail_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>>;

    async fn active_mappings(&self) -> HavenResult<Vec<UtilityAccountMapping>>;

    async fn upsert_mapping(
        &self,
        gl_account_number: &str,
        utility_type: &str,
    ) -> HavenResult<UpsertOutcome>;

    async fn deactivate_mapping(&self, gl_account_number: &str) -> HavenResult<()>;

    /// Bill details with a bill date inside the (optionally open-ended) range.
    async fn bill_details_in_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> HavenResult<Vec<BillDetail>>;

    /// Delete derived expenses in the range; returns rows removed.
    async fn delete_expenses_in_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> HavenResult<u64>;

    async fn upsert_expense(&self, expense: NewUtilityExpense) -> HavenResult<UpsertOutcome>;
}
