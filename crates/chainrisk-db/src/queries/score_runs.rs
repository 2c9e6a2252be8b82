//! Scoring run history.

use crate::pool::{DbPool, DbResult};
use rusqlite::params;

/// Score run row from database.
#[derive(Debug, Clone)]
pub struct ScoreRunRow {
    pub id: String,
    pub tenant_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub scored: i64,
    pub failed: i64,
    pub cyclic_components: i64,
    pub cancelled: bool,
}

/// Record the start of a run.
pub fn start_run(pool: &DbPool, id: &str, tenant_id: &str, started_at: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO score_runs (id, tenant_id, started_at) VALUES (?1, ?2, ?3)",
            params![id, tenant_id, started_at],
        )?;
        Ok(())
    })
}

/// Record the outcome of a run.
pub fn finish_run(
    pool: &DbPool,
    id: &str,
    finished_at: &str,
    scored: i64,
    failed: i64,
    cyclic_components: i64,
    cancelled: bool,
) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "UPDATE score_runs
             SET finished_at = ?2, scored = ?3, failed = ?4, cyclic_components = ?5, cancelled = ?6
             WHERE id = ?1",
            params![id, finished_at, scored, failed, cyclic_components, cancelled],
        )?;
        Ok(())
    })
}

/// Most recent runs of a tenant, newest first.
pub fn list_runs(pool: &DbPool, tenant_id: &str, limit: i64) -> DbResult<Vec<ScoreRunRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, started_at, finished_at, scored, failed, cyclic_components, cancelled
             FROM score_runs WHERE tenant_id = ?1
             ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![tenant_id, limit], |row| {
            Ok(ScoreRunRow {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                started_at: row.get(2)?,
                finished_at: row.get(3)?,
                scored: row.get(4)?,
                failed: row.get(5)?,
                cyclic_components: row.get(6)?,
                cancelled: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}
