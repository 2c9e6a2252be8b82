//! Tenant management.

pub mod model;

use chainrisk_db::queries::tenants as queries;
use chainrisk_db::{DbError, DbPool};
use model::Tenant;
use tracing::info;
use uuid::Uuid;

use crate::error::{ChainError, ChainResult};

/// Create a tenant.
pub fn create_tenant(pool: &DbPool, name: &str, symmetric_connections: bool) -> ChainResult<Tenant> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChainError::validation("Tenant name cannot be empty"));
    }

    let id = Uuid::new_v4().to_string();
    queries::create_tenant(pool, &id, name, symmetric_connections)?;
    info!(tenant_id = %id, name, symmetric_connections, "Tenant created");

    get_tenant(pool, &id)
}

/// Get a tenant by ID.
pub fn get_tenant(pool: &DbPool, id: &str) -> ChainResult<Tenant> {
    match queries::get_tenant(pool, id) {
        Ok(row) => Ok(Tenant::from_row(row)),
        Err(DbError::NotFound(_)) => Err(ChainError::TenantNotFound(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// List all tenants.
pub fn list_tenants(pool: &DbPool) -> ChainResult<Vec<Tenant>> {
    let rows = queries::list_tenants(pool)?;
    Ok(rows.into_iter().map(Tenant::from_row).collect())
}

/// Turn automatic reverse-pairing on or off. Existing connections are untouched.
pub fn set_symmetric_connections(pool: &DbPool, id: &str, symmetric: bool) -> ChainResult<Tenant> {
    match queries::set_symmetric_connections(pool, id, symmetric) {
        Ok(()) => get_tenant(pool, id),
        Err(DbError::NotFound(_)) => Err(ChainError::TenantNotFound(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_toggle() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let tenant = create_tenant(&pool, "  Acme  ", false).unwrap();
        assert_eq!(tenant.name, "Acme");
        assert!(!tenant.symmetric_connections);

        let tenant = set_symmetric_connections(&pool, &tenant.id, true).unwrap();
        assert!(tenant.symmetric_connections);
        assert_eq!(list_tenants(&pool).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_tenant() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        assert!(matches!(get_tenant(&pool, "nope"), Err(ChainError::TenantNotFound(_))));
        assert!(matches!(create_tenant(&pool, " ", false), Err(ChainError::ValidationError(_))));
    }
}
