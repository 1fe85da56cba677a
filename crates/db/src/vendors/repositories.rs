use async_trait::async_trait;
use uuid::Uuid;

use crate::vendors::models::{NewVendor, Vendor, VendorDuplicateAnalysis};
use haven_common::error::HavenResult;
use haven_common::types::UpsertOutcome;

#[async_trait]
pub trait VendorRepository: Send + Sync {
    async fn upsert_vendor(&self, vendor: NewVendor) -> HavenResult<UpsertOutcome>;

    async fn get(&self, id: Uuid) -> HavenResult<Option<Vendor>>;

    async fn vendor_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>>;

    async fn list_active(&self) -> HavenResult<Vec<Vendor>>;

    /// Vendors currently linked to the given canonical vendor.
    async fn duplicates_of(&self, canonical_id: Uuid) -> HavenResult<Vec<Vendor>>;

    /// Mark `vendor_id` as a duplicate of `canonical_id`.
    ///
    /// The target is first resolved to its own canonical root, so chains
    /// collapse to depth 1; any existing duplicates of `vendor_id` are
    /// re-pointed at the root. Self-links and links that would form a cycle
    /// are rejected without mutating state. Both rows are taken under
    /// row-level locks for the duration of the transaction.
    ///
    /// Returns the canonical id actually linked to (the resolved root).
    async fn link_as_duplicate(&self, vendor_id: Uuid, canonical_id: Uuid) -> HavenResult<Uuid>;

    /// Clear the vendor's canonical reference, making it canonical again.
    /// Former duplicates of this vendor are not re-parented.
    async fn unlink(&self, vendor_id: Uuid) -> HavenResult<()>;
}

#[async_trait]
pub trait VendorAnalysisRepository: Send + Sync {
    async fn create(&self, threshold: f64) -> HavenResult<VendorDuplicateAnalysis>;
    async fn get(&self, id: Uuid) -> HavenResult<Option<VendorDuplicateAnalysis>>;
    async fn mark_processing(&self, id: Uuid) -> HavenResult<VendorDuplicateAnalysis>;
    async fn update_progress(
        &self,
        id: Uuid,
        vendors_scanned: i64,
        comparisons_made: i64,
        duplicates_found: i64,
    ) -> HavenResult<()>;
    async fn complete(
        &self,
        id: Uuid,
        results: serde_json::Value,
    ) -> HavenResult<VendorDuplicateAnalysis>;
    async fn fail(&self, id: Uuid, message: &str) -> HavenResult<VendorDuplicateAnalysis>;
}
