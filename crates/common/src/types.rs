use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Result of a natural-key upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Skipped,
}

/// Resource types pulled from the property-management API.
///
/// `all()` returns them in dependency order: parents before children so
/// foreign-key resolution succeeds on the first pass in the common case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Property,
    Unit,
    Tenant,
    Lease,
    LedgerTransaction,
    WorkOrder,
    Vendor,
    BillDetail,
    Delinquency,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Unit => "unit",
            Self::Tenant => "tenant",
            Self::Lease => "lease",
            Self::LedgerTransaction => "ledger_transaction",
            Self::WorkOrder => "work_order",
            Self::Vendor => "vendor",
            Self::BillDetail => "bill_detail",
            Self::Delinquency => "delinquency",
        }
    }

    pub fn all() -> &'static [ResourceType] {
        &[
            Self::Property,
            Self::Unit,
            Self::Tenant,
            Self::Lease,
            Self::Vendor,
            Self::LedgerTransaction,
            Self::WorkOrder,
            Self::BillDetail,
            Self::Delinquency,
        ]
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "property" => Ok(Self::Property),
            "unit" => Ok(Self::Unit),
            "tenant" => Ok(Self::Tenant),
            "lease" => Ok(Self::Lease),
            "ledger_transaction" => Ok(Self::LedgerTransaction),
            "work_order" => Ok(Self::WorkOrder),
            "vendor" => Ok(Self::Vendor),
            "bill_detail" => Ok(Self::BillDetail),
            "delinquency" => Ok(Self::Delinquency),
            _ => Err(format!("unknown resource type: {value}")),
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
