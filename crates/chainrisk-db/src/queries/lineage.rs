//! Parent/child edges of acyclic lineage graphs (batch genealogy and similar).
//!
//! Several graphs share the table, separated by the `graph` column. Only
//! [`insert_edge_acyclic`] checks for cycles; the other queries leave that to
//! the DAG layer.

use crate::pool::{DbPool, DbResult};
use rusqlite::{params, TransactionBehavior};

/// Insert an edge. Inserting an existing edge is a no-op.
pub fn insert_edge(pool: &DbPool, graph: &str, parent_id: &str, child_id: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO lineage_edges (graph, parent_id, child_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![graph, parent_id, child_id, crate::now_rfc3339()],
        )?;
        Ok(())
    })
}

/// Insert an edge unless `parent_id` is reachable from `child_id` (or is
/// `child_id`). The reachability check and the insert share one immediate
/// transaction, so concurrent writers cannot both pass the check. Returns
/// false, writing nothing, when the edge would close a cycle.
pub fn insert_edge_acyclic(pool: &DbPool, graph: &str, parent_id: &str, child_id: &str) -> DbResult<bool> {
    pool.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let cycle: bool = tx.query_row(
            "WITH RECURSIVE reach(node) AS (
                 SELECT ?2
                 UNION
                 SELECT e.child_id FROM lineage_edges e
                 JOIN reach r ON e.parent_id = r.node
                 WHERE e.graph = ?1
             )
             SELECT EXISTS (SELECT 1 FROM reach WHERE node = ?3)",
            params![graph, child_id, parent_id],
            |row| row.get(0),
        )?;
        if cycle {
            return Ok(false);
        }
        tx.execute(
            "INSERT OR IGNORE INTO lineage_edges (graph, parent_id, child_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![graph, parent_id, child_id, crate::now_rfc3339()],
        )?;
        tx.commit()?;
        Ok(true)
    })
}

/// Remove an edge. Returns whether it existed.
pub fn remove_edge(pool: &DbPool, graph: &str, parent_id: &str, child_id: &str) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM lineage_edges WHERE graph = ?1 AND parent_id = ?2 AND child_id = ?3",
            params![graph, parent_id, child_id],
        )?;
        Ok(changed > 0)
    })
}

/// Direct parents of a node, ordered by ID.
pub fn parents_of(pool: &DbPool, graph: &str, node_id: &str) -> DbResult<Vec<String>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT parent_id FROM lineage_edges WHERE graph = ?1 AND child_id = ?2 ORDER BY parent_id",
        )?;
        let rows = stmt.query_map(params![graph, node_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Direct children of a node, ordered by ID.
pub fn children_of(pool: &DbPool, graph: &str, node_id: &str) -> DbResult<Vec<String>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT child_id FROM lineage_edges WHERE graph = ?1 AND parent_id = ?2 ORDER BY child_id",
        )?;
        let rows = stmt.query_map(params![graph, node_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_acyclic_rejects_reachable_parent() {
        let pool = crate::init_in_memory().unwrap();
        assert!(insert_edge_acyclic(&pool, "g", "a", "b").unwrap());
        assert!(insert_edge_acyclic(&pool, "g", "b", "c").unwrap());

        assert!(!insert_edge_acyclic(&pool, "g", "c", "a").unwrap());
        assert!(!insert_edge_acyclic(&pool, "g", "a", "a").unwrap());
        assert!(children_of(&pool, "g", "c").unwrap().is_empty());

        // Graphs are independent.
        assert!(insert_edge_acyclic(&pool, "other", "c", "a").unwrap());
    }

    #[test]
    fn test_insert_acyclic_sees_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainrisk.db");
        let first = crate::init_pool(&path).unwrap();
        let second = crate::init_pool(&path).unwrap();

        assert!(insert_edge_acyclic(&first, "g", "x", "y").unwrap());
        assert!(!insert_edge_acyclic(&second, "g", "y", "x").unwrap());
        assert_eq!(children_of(&first, "g", "y").unwrap(), Vec::<String>::new());
    }
}
