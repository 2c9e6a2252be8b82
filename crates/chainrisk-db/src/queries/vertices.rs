//! Actor/supply-chain vertex queries (`node_supply_chains`).

use crate::pool::{map_not_found, DbError, DbPool, DbResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Vertex row from database.
#[derive(Debug, Clone)]
pub struct VertexRow {
    pub id: String,
    pub actor_id: String,
    pub supply_chain_id: String,
    pub aggregate_score: f64,
    pub last_scored_at: Option<String>,
    pub active: bool,
    pub created_at: String,
}

/// A vertex joined with the actor fields the scoring engine needs.
#[derive(Debug, Clone)]
pub struct ScoringVertexRow {
    pub vertex_id: String,
    pub actor_id: String,
    pub supply_chain_id: String,
    pub role: String,
    pub baseline_risk_score: Option<f64>,
    pub aggregate_score: f64,
    pub active: bool,
}

const COLUMNS: &str =
    "id, actor_id, supply_chain_id, aggregate_score, last_scored_at, active, created_at";

const SCORING_SELECT: &str =
    "SELECT v.id, v.actor_id, v.supply_chain_id, a.role, a.baseline_risk_score,
            v.aggregate_score, v.active
     FROM node_supply_chains v
     JOIN actors a ON a.id = v.actor_id";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VertexRow> {
    Ok(VertexRow {
        id: row.get(0)?,
        actor_id: row.get(1)?,
        supply_chain_id: row.get(2)?,
        aggregate_score: row.get(3)?,
        last_scored_at: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_scoring_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoringVertexRow> {
    Ok(ScoringVertexRow {
        vertex_id: row.get(0)?,
        actor_id: row.get(1)?,
        supply_chain_id: row.get(2)?,
        role: row.get(3)?,
        baseline_risk_score: row.get(4)?,
        aggregate_score: row.get(5)?,
        active: row.get(6)?,
    })
}

/// Return the vertex ID for (actor, supply chain), creating it on first use.
///
/// Takes a bare connection so it can run inside the connection-creation
/// transaction.
pub fn ensure_vertex(
    conn: &Connection,
    new_id: &str,
    actor_id: &str,
    supply_chain_id: &str,
) -> DbResult<String> {
    conn.execute(
        "INSERT OR IGNORE INTO node_supply_chains (id, actor_id, supply_chain_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![new_id, actor_id, supply_chain_id, crate::now_rfc3339()],
    )?;

    let id = conn.query_row(
        "SELECT id FROM node_supply_chains WHERE actor_id = ?1 AND supply_chain_id = ?2",
        params![actor_id, supply_chain_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get a vertex by ID.
pub fn get_vertex(pool: &DbPool, id: &str) -> DbResult<VertexRow> {
    pool.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM node_supply_chains WHERE id = ?1"),
            params![id],
            map_row,
        )
        .map_err(|e| map_not_found(e, || format!("Vertex: {}", id)))
    })
}

/// Find the vertex for an (actor, supply chain) pair.
pub fn find_vertex(pool: &DbPool, actor_id: &str, supply_chain_id: &str) -> DbResult<Option<VertexRow>> {
    pool.with_conn(|conn| {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM node_supply_chains
                     WHERE actor_id = ?1 AND supply_chain_id = ?2"
                ),
                params![actor_id, supply_chain_id],
                map_row,
            )
            .optional()?)
    })
}

/// List the vertices of a supply chain ordered by ID.
pub fn list_vertices(pool: &DbPool, supply_chain_id: &str) -> DbResult<Vec<VertexRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM node_supply_chains WHERE supply_chain_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![supply_chain_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// List active vertices of a supply chain with their actor's role and baseline.
pub fn list_scoring_vertices(pool: &DbPool, supply_chain_id: &str) -> DbResult<Vec<ScoringVertexRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "{SCORING_SELECT} WHERE v.supply_chain_id = ?1 AND v.active = 1 ORDER BY v.id"
        ))?;
        let rows = stmt.query_map(params![supply_chain_id], map_scoring_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Scoring view of the vertex for an (actor, supply chain) pair.
pub fn find_scoring_vertex(
    pool: &DbPool,
    actor_id: &str,
    supply_chain_id: &str,
) -> DbResult<Option<ScoringVertexRow>> {
    pool.with_conn(|conn| {
        Ok(conn
            .query_row(
                &format!("{SCORING_SELECT} WHERE v.actor_id = ?1 AND v.supply_chain_id = ?2"),
                params![actor_id, supply_chain_id],
                map_scoring_row,
            )
            .optional()?)
    })
}

/// Persist a computed aggregate score.
pub fn update_score(pool: &DbPool, id: &str, score: f64, scored_at: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE node_supply_chains SET aggregate_score = ?1, last_scored_at = ?2 WHERE id = ?3",
            params![score, scored_at, id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("Vertex: {}", id)));
        }
        Ok(())
    })
}

/// Activate or deactivate a vertex.
///
/// Every connection touching the vertex is marked unsynced in the same
/// transaction, so the next pending sync re-projects it into the mirror.
pub fn set_active(pool: &DbPool, id: &str, active: bool) -> DbResult<()> {
    pool.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE node_supply_chains SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("Vertex: {}", id)));
        }
        tx.execute(
            "UPDATE graph_sync_state SET synced_at = NULL
             WHERE connection_id IN (
                 SELECT c.id
                 FROM connections c
                 JOIN node_supply_chains v ON v.supply_chain_id = c.supply_chain_id
                 WHERE v.id = ?1
                   AND (c.source_id = v.actor_id OR c.target_id = v.actor_id))",
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    })
}
