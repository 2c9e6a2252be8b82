//! Supply chain management.

pub mod model;

use chainrisk_db::queries::supply_chains as queries;
use chainrisk_db::{DbError, DbPool};
use model::SupplyChain;
use tracing::info;
use uuid::Uuid;

use crate::error::{ChainError, ChainResult};

/// Create a supply chain under a tenant.
pub fn create_supply_chain(pool: &DbPool, tenant_id: &str, name: &str) -> ChainResult<SupplyChain> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChainError::validation("Supply chain name cannot be empty"));
    }
    crate::tenant::get_tenant(pool, tenant_id)?;

    let id = Uuid::new_v4().to_string();
    match queries::create_supply_chain(pool, &id, tenant_id, name) {
        Ok(()) => {}
        Err(DbError::Conflict(msg)) => return Err(ChainError::validation(msg)),
        Err(e) => return Err(e.into()),
    }
    info!(supply_chain_id = %id, tenant_id, name, "Supply chain created");

    get_supply_chain(pool, &id)
}

/// Get a supply chain by ID.
pub fn get_supply_chain(pool: &DbPool, id: &str) -> ChainResult<SupplyChain> {
    match queries::get_supply_chain(pool, id) {
        Ok(row) => Ok(SupplyChain::from_row(row)),
        Err(DbError::NotFound(_)) => Err(ChainError::SupplyChainNotFound(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Get a supply chain, requiring it to belong to `tenant_id`.
pub fn get_tenant_supply_chain(pool: &DbPool, tenant_id: &str, id: &str) -> ChainResult<SupplyChain> {
    let chain = get_supply_chain(pool, id)?;
    if chain.tenant_id != tenant_id {
        return Err(ChainError::SupplyChainNotFound(id.to_string()));
    }
    Ok(chain)
}

/// List a tenant's supply chains ordered by ID.
pub fn list_supply_chains(pool: &DbPool, tenant_id: &str) -> ChainResult<Vec<SupplyChain>> {
    let rows = queries::list_supply_chains(pool, tenant_id)?;
    Ok(rows.into_iter().map(SupplyChain::from_row).collect())
}
