//! Per-tenant scoring run leases.
//!
//! Times are epoch milliseconds so that expiry is a plain integer comparison.

use crate::pool::{DbPool, DbResult};
use rusqlite::{params, OptionalExtension};

/// Current lease holder for a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLockRow {
    pub tenant_id: String,
    pub holder: String,
    pub acquired_at: i64,
    pub expires_at: i64,
}

/// Try to take the lease. Succeeds when no lease exists or the current one has
/// expired at `now_ms`.
pub fn try_acquire(
    pool: &DbPool,
    tenant_id: &str,
    holder: &str,
    now_ms: i64,
    lease_ms: i64,
) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO run_locks (tenant_id, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(tenant_id) DO UPDATE SET
                 holder = excluded.holder,
                 acquired_at = excluded.acquired_at,
                 expires_at = excluded.expires_at
             WHERE run_locks.expires_at <= ?3",
            params![tenant_id, holder, now_ms, now_ms + lease_ms],
        )?;
        Ok(changed == 1)
    })
}

/// Extend a lease the caller still holds.
pub fn renew(pool: &DbPool, tenant_id: &str, holder: &str, expires_at: i64) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE run_locks SET expires_at = ?3 WHERE tenant_id = ?1 AND holder = ?2",
            params![tenant_id, holder, expires_at],
        )?;
        Ok(changed == 1)
    })
}

/// Release a lease. Only the holder can release it.
pub fn release(pool: &DbPool, tenant_id: &str, holder: &str) -> DbResult<bool> {
    pool.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM run_locks WHERE tenant_id = ?1 AND holder = ?2",
            params![tenant_id, holder],
        )?;
        Ok(changed == 1)
    })
}

/// Current lease for a tenant, expired or not.
pub fn get_lock(pool: &DbPool, tenant_id: &str) -> DbResult<Option<RunLockRow>> {
    pool.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT tenant_id, holder, acquired_at, expires_at FROM run_locks WHERE tenant_id = ?1",
                params![tenant_id],
                |row| {
                    Ok(RunLockRow {
                        tenant_id: row.get(0)?,
                        holder: row.get(1)?,
                        acquired_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                },
            )
            .optional()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_exclusive_until_expiry() {
        let pool = crate::init_in_memory().unwrap();

        assert!(try_acquire(&pool, "t1", "run-a", 1_000, 500).unwrap());
        assert!(!try_acquire(&pool, "t1", "run-b", 1_200, 500).unwrap());
        // Other tenants are independent.
        assert!(try_acquire(&pool, "t2", "run-b", 1_200, 500).unwrap());

        assert!(try_acquire(&pool, "t1", "run-b", 1_500, 500).unwrap());
        assert_eq!(get_lock(&pool, "t1").unwrap().unwrap().holder, "run-b");
    }

    #[test]
    fn test_only_holder_releases() {
        let pool = crate::init_in_memory().unwrap();
        assert!(try_acquire(&pool, "t1", "run-a", 1_000, 500).unwrap());

        assert!(!release(&pool, "t1", "run-b").unwrap());
        assert!(!renew(&pool, "t1", "run-b", 9_000).unwrap());
        assert!(renew(&pool, "t1", "run-a", 9_000).unwrap());
        assert!(release(&pool, "t1", "run-a").unwrap());
        assert!(get_lock(&pool, "t1").unwrap().is_none());
    }
}
