use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::portfolio::models::{
    NewLease, NewLedgerTransaction, NewProperty, NewTenant, NewUnit, NewWorkOrder,
};
use haven_common::error::HavenResult;
use haven_common::types::UpsertOutcome;

/// Natural-key upserts for the synced portfolio entities, plus the
/// external-id lookups normalization uses to resolve parent references
/// before a child row is written.
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    async fn upsert_property(&self, property: NewProperty) -> HavenResult<UpsertOutcome>;
    async fn upsert_unit(&self, unit: NewUnit) -> HavenResult<UpsertOutcome>;
    async fn upsert_tenant(&self, tenant: NewTenant) -> HavenResult<UpsertOutcome>;
    async fn upsert_lease(&self, lease: NewLease) -> HavenResult<UpsertOutcome>;
    async fn upsert_ledger_transaction(
        &self,
        transaction: NewLedgerTransaction,
    ) -> HavenResult<UpsertOutcome>;
    async fn upsert_work_order(&self, work_order: NewWorkOrder) -> HavenResult<UpsertOutcome>;

    async fn property_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>>;
    async fn unit_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>>;
    async fn tenant_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>>;
    async fn lease_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>>;

    /// Delinquency report rows land on the tenant: update the outstanding
    /// balance on an already-synced tenant, `Skipped` if unknown.
    async fn update_tenant_delinquency(
        &self,
        external_id: i64,
        amount_cents: i64,
        as_of: NaiveDate,
    ) -> HavenResult<UpsertOutcome>;
}
