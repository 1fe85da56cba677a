pub mod bills;
pub mod parse;
pub mod portfolio;
pub mod vendors;

use std::collections::HashMap;
use std::sync::Arc;

use haven_common::error::HavenError;
use haven_common::types::{ResourceType, UpsertOutcome};
use haven_db::portfolio::repositories::PortfolioRepository;
use haven_db::raw::models::RawEvent;
use haven_db::utilities::models::UtilityAccountMapping;
use haven_db::utilities::repositories::UtilitiesRepository;
use haven_db::vendors::repositories::VendorRepository;

use crate::reclassify::{derive_expense, Derivation};
use self::parse::i64_field;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("repository error: {0}")]
    Repository(String),
}

impl From<HavenError> for NormalizeError {
    fn from(e: HavenError) -> Self {
        Self::Repository(e.to_string())
    }
}

/// What became of one raw event.
///
/// `Deferred` means a parent the record references has not been synced yet;
/// the runner retries the event later in the same run instead of dropping it.
#[derive(Debug)]
pub enum NormalizeOutcome {
    Applied(UpsertOutcome),
    Deferred(String),
}

/// Maps raw payloads onto typed entities and performs the natural-key
/// upserts. Parent references are resolved before a child row is written.
pub struct Normalizer {
    portfolio: Arc<dyn PortfolioRepository>,
    vendors: Arc<dyn VendorRepository>,
    utilities: Arc<dyn UtilitiesRepository>,
    /// GL account → utility type, loaded once at run start.
    mappings: HashMap<String, String>,
}

impl Normalizer {
    pub fn new(
        portfolio: Arc<dyn PortfolioRepository>,
        vendors: Arc<dyn VendorRepository>,
        utilities: Arc<dyn UtilitiesRepository>,
        mappings: Vec<UtilityAccountMapping>,
    ) -> Self {
        Self {
            portfolio,
            vendors,
            utilities,
            mappings: mappings
                .into_iter()
                .map(|m| (m.gl_account_number, m.utility_type))
                .collect(),
        }
    }

    pub async fn normalize_event(
        &self,
        event: &RawEvent,
    ) -> Result<NormalizeOutcome, NormalizeError> {
        let payload = &event.payload;

        match event.resource_type {
            ResourceType::Property => {
                let property = portfolio::map_property(payload)?;
                let outcome = self.portfolio.upsert_property(property).await?;
                Ok(NormalizeOutcome::Applied(outcome))
            }

            ResourceType::Unit => {
                let parent = i64_field(payload, "property_id")
                    .ok_or(NormalizeError::MissingField("property_id"))?;
                let Some(property_id) = self.portfolio.property_id_by_external(parent).await?
                else {
                    return Ok(NormalizeOutcome::Deferred(format!(
                        "property {parent} not yet synced"
                    )));
                };
                let unit = portfolio::map_unit(payload, property_id)?;
                let outcome = self.portfolio.upsert_unit(unit).await?;
                Ok(NormalizeOutcome::Applied(outcome))
            }

            ResourceType::Tenant => {
                let tenant = portfolio::map_tenant(payload)?;
                let outcome = self.portfolio.upsert_tenant(tenant).await?;
                Ok(NormalizeOutcome::Applied(outcome))
            }

            ResourceType::Lease => {
                let unit_ext = i64_field(payload, "unit_id")
                    .ok_or(NormalizeError::MissingField("unit_id"))?;
                let tenant_ext = i64_field(payload, "tenant_id")
                    .ok_or(NormalizeError::MissingField("tenant_id"))?;

                let Some(unit_id) = self.portfolio.unit_id_by_external(unit_ext).await? else {
                    return Ok(NormalizeOutcome::Deferred(format!(
                        "unit {unit_ext} not yet synced"
                    )));
                };
                let Some(tenant_id) = self.portfolio.tenant_id_by_external(tenant_ext).await?
                else {
                    return Ok(NormalizeOutcome::Deferred(format!(
                        "tenant {tenant_ext} not yet synced"
                    )));
                };

                let lease = portfolio::map_lease(payload, unit_id, tenant_id)?;
                let outcome = self.portfolio.upsert_lease(lease).await?;
                Ok(NormalizeOutcome::Applied(outcome))
            }

            ResourceType::LedgerTransaction => {
                // Both references are optional on the row, but a present
                // reference must resolve before the row is written
                let lease_id = match i64_field(payload, "lease_id") {
                    Some(ext) => match self.portfolio.lease_id_by_external(ext).await? {
                        Some(id) => Some(id),
                        None => {
                            return Ok(NormalizeOutcome::Deferred(format!(
                                "lease {ext} not yet synced"
                            )))
                        }
                    },
                    None => None,
                };
                let property_id = match i64_field(payload, "property_id") {
                    Some(ext) => match self.portfolio.property_id_by_external(ext).await? {
                        Some(id) => Some(id),
                        None => {
                            return Ok(NormalizeOutcome::Deferred(format!(
                                "property {ext} not yet synced"
                            )))
                        }
                    },
                    None => None,
                };

                let txn = portfolio::map_ledger_transaction(payload, lease_id, property_id)?;
                let outcome = self.portfolio.upsert_ledger_transaction(txn).await?;
                Ok(NormalizeOutcome::Applied(outcome))
            }

            ResourceType::WorkOrder => {
                let property_ext = i64_field(payload, "property_id")
                    .ok_or(NormalizeError::MissingField("property_id"))?;
                let Some(property_id) =
                    self.portfolio.property_id_by_external(property_ext).await?
                else {
                    return Ok(NormalizeOutcome::Deferred(format!(
                        "property {property_ext} not yet synced"
                    )));
                };

                let unit_id = match i64_field(payload, "unit_id") {
                    Some(ext) => self.portfolio.unit_id_by_external(ext).await?,
                    None => None,
                };
                let vendor_id = match i64_field(payload, "vendor_id") {
                    Some(ext) => match self.vendors.vendor_id_by_external(ext).await? {
                        Some(id) => Some(id),
                        None => {
                            return Ok(NormalizeOutcome::Deferred(format!(
                                "vendor {ext} not yet synced"
                            )))
                        }
                    },
                    None => None,
                };

                let work_order =
                    portfolio::map_work_order(payload, property_id, unit_id, vendor_id)?;
                let outcome = self.portfolio.upsert_work_order(work_order).await?;
                Ok(NormalizeOutcome::Applied(outcome))
            }

            ResourceType::Vendor => {
                let vendor = vendors::map_vendor(payload)?;
                let outcome = self.vendors.upsert_vendor(vendor).await?;
                Ok(NormalizeOutcome::Applied(outcome))
            }

            ResourceType::BillDetail => {
                let bill = bills::map_bill_detail(payload)?;
                let external_id = bill.external_id;
                let property_external_id = bill.property_external_id;
                let gl_account = bill.gl_account_number.clone();
                let amount_cents = bill.amount_cents;
                let bill_date = bill.bill_date;

                let outcome = self.utilities.upsert_bill_detail(bill).await?;

                // Classification happens at ingest time too; reclassification
                // later re-derives the same thing from the stored rows
                if let Some(bill_detail_id) =
                    self.utilities.bill_detail_id_by_external(external_id).await?
                {
                    if let Derivation::Mapped(expense) = derive_expense(
                        bill_detail_id,
                        property_external_id,
                        gl_account.as_deref(),
                        amount_cents,
                        bill_date,
                        &self.mappings,
                    ) {
                        self.utilities.upsert_expense(expense).await?;
                    }
                }

                Ok(NormalizeOutcome::Applied(outcome))
            }

            ResourceType::Delinquency => {
                let fields = portfolio::map_delinquency(payload)?;
                let outcome = self
                    .portfolio
                    .update_tenant_delinquency(
                        fields.tenant_external_id,
                        fields.amount_cents,
                        fields.as_of,
                    )
                    .await?;
                Ok(NormalizeOutcome::Applied(outcome))
            }
        }
    }
}
