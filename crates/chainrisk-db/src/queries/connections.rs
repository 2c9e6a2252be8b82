//! Connection (edge) queries.
//!
//! Row-level helpers that take a bare [`Connection`] are meant to run inside a
//! caller-owned transaction so that a connection and its reverse pair commit
//! together.

use crate::pool::{map_not_found, map_unique, DbPool, DbResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Connection row from database.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRow {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub supply_chain_id: String,
    pub is_buyer: bool,
    pub is_supplier: bool,
    pub status: String,
    pub initiation: String,
    pub paired_with: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str = "id, source_id, target_id, supply_chain_id, is_buyer, is_supplier,
                       status, initiation, paired_with, created_at, updated_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectionRow> {
    Ok(ConnectionRow {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        supply_chain_id: row.get(3)?,
        is_buyer: row.get(4)?,
        is_supplier: row.get(5)?,
        status: row.get(6)?,
        initiation: row.get(7)?,
        paired_with: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Insert a connection row. A duplicate (source, target, supply chain) triple
/// is reported as [`crate::DbError::Conflict`].
pub fn insert_connection(conn: &Connection, row: &ConnectionRow) -> DbResult<()> {
    conn.execute(
        "INSERT INTO connections (id, source_id, target_id, supply_chain_id, is_buyer, is_supplier,
                                  status, initiation, paired_with, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.id,
            row.source_id,
            row.target_id,
            row.supply_chain_id,
            row.is_buyer,
            row.is_supplier,
            row.status,
            row.initiation,
            row.paired_with,
            row.created_at,
            row.updated_at,
        ],
    )
    .map_err(|e| {
        map_unique(e, || {
            format!(
                "Connection {} -> {} already exists in supply chain {}",
                row.source_id, row.target_id, row.supply_chain_id
            )
        })
    })?;
    Ok(())
}

/// Look up a connection by its (source, target, supply chain) triple.
pub fn find_by_endpoints(
    conn: &Connection,
    source_id: &str,
    target_id: &str,
    supply_chain_id: &str,
) -> DbResult<Option<ConnectionRow>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM connections
                 WHERE source_id = ?1 AND target_id = ?2 AND supply_chain_id = ?3"
            ),
            params![source_id, target_id, supply_chain_id],
            map_row,
        )
        .optional()?)
}

/// Point a connection at its reverse pair.
pub fn set_paired_with(conn: &Connection, id: &str, paired_with: &str) -> DbResult<()> {
    conn.execute(
        "UPDATE connections SET paired_with = ?1 WHERE id = ?2",
        params![paired_with, id],
    )?;
    Ok(())
}

/// Change a connection's status.
pub fn update_status(conn: &Connection, id: &str, status: &str, updated_at: &str) -> DbResult<()> {
    conn.execute(
        "UPDATE connections SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, updated_at, id],
    )?;
    Ok(())
}

/// Fetch a connection by ID on a bare connection.
pub fn get_connection_tx(conn: &Connection, id: &str) -> DbResult<ConnectionRow> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM connections WHERE id = ?1"),
        params![id],
        map_row,
    )
    .map_err(|e| map_not_found(e, || format!("Connection: {}", id)))
}

/// Get a connection by ID.
pub fn get_connection(pool: &DbPool, id: &str) -> DbResult<ConnectionRow> {
    pool.with_conn(|conn| get_connection_tx(conn, id))
}

/// List every connection of a supply chain ordered by ID.
pub fn list_connections(pool: &DbPool, supply_chain_id: &str) -> DbResult<Vec<ConnectionRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM connections WHERE supply_chain_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![supply_chain_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// List every connection of a tenant ordered by supply chain, then ID.
pub fn list_tenant_connections(pool: &DbPool, tenant_id: &str) -> DbResult<Vec<ConnectionRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT c.id, c.source_id, c.target_id, c.supply_chain_id, c.is_buyer, c.is_supplier,
                    c.status, c.initiation, c.paired_with, c.created_at, c.updated_at
             FROM connections c
             JOIN supply_chains sc ON sc.id = c.supply_chain_id
             WHERE sc.tenant_id = ?1
             ORDER BY c.supply_chain_id, c.id",
        )?;
        let rows = stmt.query_map(params![tenant_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// List connections touching an actor within a supply chain, in either role.
pub fn list_actor_connections(
    pool: &DbPool,
    actor_id: &str,
    supply_chain_id: &str,
) -> DbResult<Vec<ConnectionRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM connections
             WHERE supply_chain_id = ?2 AND (source_id = ?1 OR target_id = ?1)
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![actor_id, supply_chain_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{actors, supply_chains, tenants};
    use crate::DbError;

    fn seed() -> DbPool {
        let pool = crate::init_in_memory().unwrap();
        tenants::create_tenant(&pool, "t1", "Tenant", false).unwrap();
        supply_chains::create_supply_chain(&pool, "sc1", "t1", "Cocoa").unwrap();
        actors::create_actor(&pool, "a1", "t1", "Farm", "PRODUCER", None).unwrap();
        actors::create_actor(&pool, "a2", "t1", "Coop", "COMPANY", None).unwrap();
        pool
    }

    fn row(id: &str, source: &str, target: &str) -> ConnectionRow {
        let now = crate::now_rfc3339();
        ConnectionRow {
            id: id.to_string(),
            source_id: source.to_string(),
            target_id: target.to_string(),
            supply_chain_id: "sc1".to_string(),
            is_buyer: false,
            is_supplier: true,
            status: "PENDING".to_string(),
            initiation: "MANUAL".to_string(),
            paired_with: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_duplicate_triple_is_conflict() {
        let pool = seed();
        pool.with_conn(|conn| insert_connection(conn, &row("c1", "a2", "a1"))).unwrap();

        let err = pool
            .with_conn(|conn| insert_connection(conn, &row("c2", "a2", "a1")))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        // The reverse direction is a different triple.
        pool.with_conn(|conn| insert_connection(conn, &row("c3", "a1", "a2"))).unwrap();
    }

    #[test]
    fn test_actor_connections_cover_both_roles() {
        let pool = seed();
        pool.with_conn(|conn| insert_connection(conn, &row("c1", "a2", "a1"))).unwrap();

        assert_eq!(list_actor_connections(&pool, "a1", "sc1").unwrap().len(), 1);
        assert_eq!(list_actor_connections(&pool, "a2", "sc1").unwrap().len(), 1);
        assert!(list_actor_connections(&pool, "a2", "other").unwrap().is_empty());
    }

    #[test]
    fn test_update_status() {
        let pool = seed();
        pool.with_conn(|conn| insert_connection(conn, &row("c1", "a2", "a1"))).unwrap();
        pool.with_conn(|conn| update_status(conn, "c1", "APPROVED", &crate::now_rfc3339()))
            .unwrap();

        assert_eq!(get_connection(&pool, "c1").unwrap().status, "APPROVED");
        assert_eq!(list_tenant_connections(&pool, "t1").unwrap().len(), 1);
    }
}
