//! Tenant domain model.

use chainrisk_db::queries::tenants::TenantRow;
use serde::{Deserialize, Serialize};

/// An isolated customer namespace. Every other record belongs to one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// New connections get an automatic reverse pair.
    pub symmetric_connections: bool,
    pub created_at: String,
}

impl Tenant {
    pub fn from_row(row: TenantRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            symmetric_connections: row.symmetric_connections,
            created_at: row.created_at,
        }
    }
}
