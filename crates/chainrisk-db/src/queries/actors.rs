//! Actor queries.

use crate::pool::{map_not_found, map_unique, DbError, DbPool, DbResult};
use rusqlite::params;

/// Actor row from database.
#[derive(Debug, Clone)]
pub struct ActorRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub role: String,
    pub baseline_risk_score: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str =
    "id, tenant_id, name, role, baseline_risk_score, created_at, updated_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActorRow> {
    Ok(ActorRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        baseline_risk_score: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Create an actor.
pub fn create_actor(
    pool: &DbPool,
    id: &str,
    tenant_id: &str,
    name: &str,
    role: &str,
    baseline_risk_score: Option<f64>,
) -> DbResult<()> {
    let now = crate::now_rfc3339();
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO actors (id, tenant_id, name, role, baseline_risk_score, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, tenant_id, name, role, baseline_risk_score, now],
        )
        .map_err(|e| map_unique(e, || format!("Actor already exists: {}", id)))?;
        Ok(())
    })
}

/// Get an actor by ID.
pub fn get_actor(pool: &DbPool, id: &str) -> DbResult<ActorRow> {
    pool.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM actors WHERE id = ?1"),
            params![id],
            map_row,
        )
        .map_err(|e| map_not_found(e, || format!("Actor: {}", id)))
    })
}

/// List a tenant's actors ordered by ID.
pub fn list_actors(pool: &DbPool, tenant_id: &str) -> DbResult<Vec<ActorRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM actors WHERE tenant_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![tenant_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Replace an actor's baseline risk score. `None` clears it.
pub fn set_baseline_risk_score(pool: &DbPool, id: &str, score: Option<f64>) -> DbResult<()> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE actors SET baseline_risk_score = ?1, updated_at = ?2 WHERE id = ?3",
            params![score, crate::now_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("Actor: {}", id)));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tenants;

    #[test]
    fn test_baseline_roundtrip() {
        let pool = crate::init_in_memory().unwrap();
        tenants::create_tenant(&pool, "t1", "Tenant", false).unwrap();
        create_actor(&pool, "a1", "t1", "Farm", "PRODUCER", None).unwrap();

        assert_eq!(get_actor(&pool, "a1").unwrap().baseline_risk_score, None);

        set_baseline_risk_score(&pool, "a1", Some(72.5)).unwrap();
        assert_eq!(get_actor(&pool, "a1").unwrap().baseline_risk_score, Some(72.5));
    }

    #[test]
    fn test_role_is_checked() {
        let pool = crate::init_in_memory().unwrap();
        tenants::create_tenant(&pool, "t1", "Tenant", false).unwrap();
        assert!(create_actor(&pool, "a1", "t1", "Farm", "FARMER", None).is_err());
    }
}
