//! Supply chain queries.

use crate::pool::{map_not_found, map_unique, DbPool, DbResult};
use rusqlite::params;

/// Supply chain row from database.
#[derive(Debug, Clone)]
pub struct SupplyChainRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub created_at: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SupplyChainRow> {
    Ok(SupplyChainRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Create a supply chain under a tenant. Names are unique per tenant.
pub fn create_supply_chain(pool: &DbPool, id: &str, tenant_id: &str, name: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO supply_chains (id, tenant_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, tenant_id, name, crate::now_rfc3339()],
        )
        .map_err(|e| map_unique(e, || format!("Supply chain '{}' already exists", name)))?;
        Ok(())
    })
}

/// Get a supply chain by ID.
pub fn get_supply_chain(pool: &DbPool, id: &str) -> DbResult<SupplyChainRow> {
    pool.with_conn(|conn| {
        conn.query_row(
            "SELECT id, tenant_id, name, created_at FROM supply_chains WHERE id = ?1",
            params![id],
            map_row,
        )
        .map_err(|e| map_not_found(e, || format!("Supply chain: {}", id)))
    })
}

/// List a tenant's supply chains ordered by ID.
pub fn list_supply_chains(pool: &DbPool, tenant_id: &str) -> DbResult<Vec<SupplyChainRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, created_at FROM supply_chains
             WHERE tenant_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![tenant_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}
