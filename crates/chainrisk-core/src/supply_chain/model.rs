//! Supply chain domain model.

use chainrisk_db::queries::supply_chains::SupplyChainRow;
use serde::{Deserialize, Serialize};

/// A named scope of connections under a tenant (for example one commodity).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplyChain {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub created_at: String,
}

impl SupplyChain {
    pub fn from_row(row: SupplyChainRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}
