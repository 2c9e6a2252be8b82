//! Graph mirror sync bookkeeping.
//!
//! One row per connection. A connection needs syncing when it has no row yet,
//! when its last attempt failed, or when it changed after the last success.

use crate::pool::{DbPool, DbResult};
use rusqlite::params;

/// Record a successful sync of a connection.
pub fn mark_synced(pool: &DbPool, connection_id: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO graph_sync_state (connection_id, synced_at, sync_version, last_error)
             VALUES (?1, ?2, 1, NULL)
             ON CONFLICT(connection_id) DO UPDATE SET
                 synced_at = excluded.synced_at,
                 sync_version = graph_sync_state.sync_version + 1,
                 last_error = NULL",
            params![connection_id, crate::now_rfc3339()],
        )?;
        Ok(())
    })
}

/// Record a failed sync attempt. The previous success time is kept.
pub fn mark_failed(pool: &DbPool, connection_id: &str, error: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO graph_sync_state (connection_id, synced_at, sync_version, last_error)
             VALUES (?1, NULL, 0, ?2)
             ON CONFLICT(connection_id) DO UPDATE SET last_error = excluded.last_error",
            params![connection_id, error],
        )?;
        Ok(())
    })
}

/// IDs of a tenant's connections whose mirror copy is missing or stale.
pub fn list_pending(pool: &DbPool, tenant_id: &str) -> DbResult<Vec<String>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT c.id
             FROM connections c
             JOIN supply_chains sc ON sc.id = c.supply_chain_id
             LEFT JOIN graph_sync_state s ON s.connection_id = c.id
             WHERE sc.tenant_id = ?1
               AND (s.connection_id IS NULL
                    OR s.last_error IS NOT NULL
                    OR s.synced_at IS NULL
                    OR s.synced_at < c.updated_at)
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map(params![tenant_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Last error recorded for a connection, if any.
pub fn last_error(pool: &DbPool, connection_id: &str) -> DbResult<Option<String>> {
    pool.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT last_error FROM graph_sync_state WHERE connection_id = ?1")?;
        let mut rows = stmt.query(params![connection_id])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    })
}

/// Most recent successful sync time across a tenant's connections.
pub fn get_last_sync_time(pool: &DbPool, tenant_id: &str) -> DbResult<Option<String>> {
    pool.with_conn(|conn| {
        Ok(conn.query_row(
            "SELECT MAX(s.synced_at)
             FROM graph_sync_state s
             JOIN connections c ON c.id = s.connection_id
             JOIN supply_chains sc ON sc.id = c.supply_chain_id
             WHERE sc.tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::connections::{insert_connection, ConnectionRow};
    use crate::queries::{actors, supply_chains, tenants};

    fn seed() -> DbPool {
        let pool = crate::init_in_memory().unwrap();
        tenants::create_tenant(&pool, "t1", "Tenant", false).unwrap();
        supply_chains::create_supply_chain(&pool, "sc1", "t1", "Cocoa").unwrap();
        actors::create_actor(&pool, "a1", "t1", "Farm", "PRODUCER", None).unwrap();
        actors::create_actor(&pool, "a2", "t1", "Coop", "COMPANY", None).unwrap();
        // Backdated so a sync performed now is newer than the row.
        let created = "2020-01-01T00:00:00+00:00".to_string();
        let row = ConnectionRow {
            id: "c1".to_string(),
            source_id: "a2".to_string(),
            target_id: "a1".to_string(),
            supply_chain_id: "sc1".to_string(),
            is_buyer: false,
            is_supplier: true,
            status: "APPROVED".to_string(),
            initiation: "MANUAL".to_string(),
            paired_with: None,
            created_at: created.clone(),
            updated_at: created,
        };
        pool.with_conn(|conn| insert_connection(conn, &row)).unwrap();
        pool
    }

    #[test]
    fn test_pending_lifecycle() {
        let pool = seed();
        assert_eq!(list_pending(&pool, "t1").unwrap(), vec!["c1".to_string()]);
        assert_eq!(get_last_sync_time(&pool, "t1").unwrap(), None);

        mark_synced(&pool, "c1").unwrap();
        assert!(list_pending(&pool, "t1").unwrap().is_empty());
        assert!(get_last_sync_time(&pool, "t1").unwrap().is_some());

        mark_failed(&pool, "c1", "neo4j unreachable").unwrap();
        assert_eq!(list_pending(&pool, "t1").unwrap().len(), 1);
        assert_eq!(last_error(&pool, "c1").unwrap().as_deref(), Some("neo4j unreachable"));

        mark_synced(&pool, "c1").unwrap();
        assert_eq!(last_error(&pool, "c1").unwrap(), None);
    }
}
