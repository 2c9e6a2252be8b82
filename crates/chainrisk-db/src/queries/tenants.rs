//! Tenant queries.

use crate::pool::{map_not_found, map_unique, DbPool, DbResult};
use rusqlite::params;

/// Tenant row from database.
#[derive(Debug, Clone)]
pub struct TenantRow {
    pub id: String,
    pub name: String,
    pub symmetric_connections: bool,
    pub created_at: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TenantRow> {
    Ok(TenantRow {
        id: row.get(0)?,
        name: row.get(1)?,
        symmetric_connections: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Create a tenant.
pub fn create_tenant(pool: &DbPool, id: &str, name: &str, symmetric_connections: bool) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tenants (id, name, symmetric_connections, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, name, symmetric_connections, crate::now_rfc3339()],
        )
        .map_err(|e| map_unique(e, || format!("Tenant already exists: {}", id)))?;
        Ok(())
    })
}

/// Get a tenant by ID.
pub fn get_tenant(pool: &DbPool, id: &str) -> DbResult<TenantRow> {
    pool.with_conn(|conn| {
        conn.query_row(
            "SELECT id, name, symmetric_connections, created_at FROM tenants WHERE id = ?1",
            params![id],
            map_row,
        )
        .map_err(|e| map_not_found(e, || format!("Tenant: {}", id)))
    })
}

/// List all tenants, oldest first.
pub fn list_tenants(pool: &DbPool) -> DbResult<Vec<TenantRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, symmetric_connections, created_at FROM tenants ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Toggle automatic reverse-pairing of new connections.
pub fn set_symmetric_connections(pool: &DbPool, id: &str, symmetric: bool) -> DbResult<()> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE tenants SET symmetric_connections = ?1 WHERE id = ?2",
            params![symmetric, id],
        )?;
        if changed == 0 {
            return Err(crate::DbError::NotFound(format!("Tenant: {}", id)));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;

    #[test]
    fn test_create_and_get_tenant() {
        let pool = crate::init_in_memory().unwrap();
        create_tenant(&pool, "t1", "Acme Cocoa", true).unwrap();

        let tenant = get_tenant(&pool, "t1").unwrap();
        assert_eq!(tenant.name, "Acme Cocoa");
        assert!(tenant.symmetric_connections);
    }

    #[test]
    fn test_duplicate_tenant_is_conflict() {
        let pool = crate::init_in_memory().unwrap();
        create_tenant(&pool, "t1", "Acme", false).unwrap();

        let err = create_tenant(&pool, "t1", "Acme", false).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn test_missing_tenant_is_not_found() {
        let pool = crate::init_in_memory().unwrap();
        assert!(matches!(get_tenant(&pool, "nope"), Err(DbError::NotFound(_))));
        assert!(matches!(
            set_symmetric_connections(&pool, "nope", true),
            Err(DbError::NotFound(_))
        ));
    }
}
