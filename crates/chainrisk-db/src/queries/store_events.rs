//! Persisted store events.
//!
//! `publish` appends here as well as broadcasting in-process, so a daemon in
//! another process can follow writes by polling for new sequence numbers.

use crate::pool::{DbPool, DbResult};
use rusqlite::params;

/// One logged event. `payload` is the JSON form of a `StoreEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEventRow {
    pub seq: i64,
    pub origin: String,
    pub tenant_id: String,
    pub payload: String,
    pub created_at: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreEventRow> {
    Ok(StoreEventRow {
        seq: row.get(0)?,
        origin: row.get(1)?,
        tenant_id: row.get(2)?,
        payload: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Append an event and return its sequence number.
pub fn append(pool: &DbPool, origin: &str, tenant_id: &str, payload: &str) -> DbResult<i64> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO store_events (origin, tenant_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![origin, tenant_id, payload, crate::now_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Highest sequence number logged so far, 0 for an empty log.
pub fn latest_seq(pool: &DbPool) -> DbResult<i64> {
    pool.with_conn(|conn| {
        Ok(conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM store_events", [], |row| row.get(0))?)
    })
}

/// Events after `after_seq` in sequence order, skipping those written by
/// `exclude_origin`.
pub fn list_after(pool: &DbPool, after_seq: i64, exclude_origin: &str, limit: i64) -> DbResult<Vec<StoreEventRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT seq, origin, tenant_id, payload, created_at
             FROM store_events
             WHERE seq > ?1 AND origin != ?2
             ORDER BY seq
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![after_seq, exclude_origin, limit], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Delete events logged before `cutoff` (RFC 3339). Returns the number removed.
pub fn prune_before(pool: &DbPool, cutoff: &str) -> DbResult<usize> {
    pool.with_conn(|conn| Ok(conn.execute("DELETE FROM store_events WHERE created_at < ?1", params![cutoff])?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_after_skips_own_origin() {
        let pool = crate::init_in_memory().unwrap();
        assert_eq!(latest_seq(&pool).unwrap(), 0);

        let first = append(&pool, "me", "t1", "{}").unwrap();
        let second = append(&pool, "other", "t1", "{}").unwrap();
        assert!(second > first);
        assert_eq!(latest_seq(&pool).unwrap(), second);

        let rows = list_after(&pool, 0, "me", 100).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].seq, second);
        assert_eq!(rows[0].origin, "other");

        assert!(list_after(&pool, second, "me", 100).unwrap().is_empty());
    }

    #[test]
    fn test_prune_before() {
        let pool = crate::init_in_memory().unwrap();
        append(&pool, "me", "t1", "{}").unwrap();

        assert_eq!(prune_before(&pool, "2000-01-01T00:00:00+00:00").unwrap(), 0);
        assert_eq!(prune_before(&pool, "9999-01-01T00:00:00+00:00").unwrap(), 1);
        assert_eq!(latest_seq(&pool).unwrap(), 0);
    }
}
