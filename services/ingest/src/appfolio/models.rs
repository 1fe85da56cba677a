use haven_common::types::ResourceType;
use serde::{Deserialize, Serialize};

/// One page of a report response. `next_page_url` is an absolute cursor;
/// the sequence is finite and restartable from any page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPage {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_page_url: Option<String>,
}

/// Report endpoint for each resource type.
pub fn report_name(resource: ResourceType) -> &'static str {
    match resource {
        ResourceType::Property => "property_directory",
        ResourceType::Unit => "unit_directory",
        ResourceType::Tenant => "tenant_directory",
        ResourceType::Lease => "rent_roll",
        ResourceType::LedgerTransaction => "general_ledger",
        ResourceType::WorkOrder => "work_order",
        ResourceType::Vendor => "vendor_directory",
        ResourceType::BillDetail => "bill_detail",
        ResourceType::Delinquency => "delinquency",
    }
}

/// Field carrying the source system's id in each report row. Raw events
/// are tagged with this value for replay and debugging.
pub fn external_id_field(resource: ResourceType) -> &'static str {
    match resource {
        ResourceType::Property => "property_id",
        ResourceType::Unit => "unit_id",
        ResourceType::Tenant => "tenant_id",
        ResourceType::Lease => "lease_id",
        ResourceType::LedgerTransaction => "gl_transaction_id",
        ResourceType::WorkOrder => "work_order_id",
        ResourceType::Vendor => "vendor_id",
        ResourceType::BillDetail => "bill_detail_id",
        ResourceType::Delinquency => "tenant_id",
    }
}
