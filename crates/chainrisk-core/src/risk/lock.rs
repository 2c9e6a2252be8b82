//! Per-tenant run leases.
//!
//! At most one scoring run per tenant at a time. A lease expires on its own so
//! a crashed holder cannot block a tenant forever.

use std::time::Duration;

use async_trait::async_trait;
use chainrisk_db::queries::run_locks;
use chainrisk_db::DbPool;
use chainrisk_redis::RedisPool;
use tracing::debug;

use crate::error::{ChainError, ChainResult};

/// Lease lock keyed by tenant.
#[async_trait]
pub trait RunLock: Send + Sync {
    /// Try to take the lease. False when someone else holds a live one.
    async fn try_acquire(&self, tenant_id: &str, holder: &str) -> ChainResult<bool>;

    /// Push the expiry of a lease `holder` still has one lease length into
    /// the future. False when the lease was lost.
    async fn renew(&self, tenant_id: &str, holder: &str) -> ChainResult<bool>;

    /// Release the lease if `holder` still has it.
    async fn release(&self, tenant_id: &str, holder: &str) -> ChainResult<()>;

    /// Take the lease or fail with [`ChainError::RunConflict`].
    async fn acquire(&self, tenant_id: &str, holder: &str) -> ChainResult<()> {
        if self.try_acquire(tenant_id, holder).await? {
            Ok(())
        } else {
            Err(ChainError::RunConflict(tenant_id.to_string()))
        }
    }
}

/// Lease stored in the `run_locks` table.
#[derive(Clone)]
pub struct SqliteRunLock {
    pool: DbPool,
    lease: Duration,
}

impl SqliteRunLock {
    pub fn new(pool: DbPool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    fn lease_millis(&self) -> i64 {
        i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl RunLock for SqliteRunLock {
    async fn try_acquire(&self, tenant_id: &str, holder: &str) -> ChainResult<bool> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let acquired = run_locks::try_acquire(&self.pool, tenant_id, holder, now_ms, self.lease_millis())?;
        debug!(tenant_id, holder, acquired, "SQLite lease attempt");
        Ok(acquired)
    }

    async fn renew(&self, tenant_id: &str, holder: &str) -> ChainResult<bool> {
        let expires_at = chrono::Utc::now().timestamp_millis().saturating_add(self.lease_millis());
        Ok(run_locks::renew(&self.pool, tenant_id, holder, expires_at)?)
    }

    async fn release(&self, tenant_id: &str, holder: &str) -> ChainResult<()> {
        run_locks::release(&self.pool, tenant_id, holder)?;
        Ok(())
    }
}

/// Lease stored as a Redis key with a TTL, for several schedulers sharing one
/// store.
#[derive(Clone)]
pub struct RedisRunLock {
    pool: RedisPool,
    lease: Duration,
}

impl RedisRunLock {
    pub fn new(pool: RedisPool, lease: Duration) -> Self {
        Self { pool, lease }
    }
}

#[async_trait]
impl RunLock for RedisRunLock {
    async fn try_acquire(&self, tenant_id: &str, holder: &str) -> ChainResult<bool> {
        Ok(chainrisk_redis::acquire_lease(&self.pool, tenant_id, holder, self.lease).await?)
    }

    async fn renew(&self, tenant_id: &str, holder: &str) -> ChainResult<bool> {
        Ok(chainrisk_redis::renew_lease(&self.pool, tenant_id, holder, self.lease).await?)
    }

    async fn release(&self, tenant_id: &str, holder: &str) -> ChainResult<()> {
        chainrisk_redis::release_lease(&self.pool, tenant_id, holder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_conflicts() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let lock = SqliteRunLock::new(pool, Duration::from_secs(60));

        lock.acquire("t1", "worker-1").await.unwrap();
        let err = lock.acquire("t1", "worker-2").await.unwrap_err();
        assert!(matches!(err, ChainError::RunConflict(ref t) if t == "t1"));

        // Other tenants are independent.
        lock.acquire("t2", "worker-2").await.unwrap();

        lock.release("t1", "worker-1").await.unwrap();
        lock.acquire("t1", "worker-2").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let short = SqliteRunLock::new(pool.clone(), Duration::from_millis(1));
        short.acquire("t1", "crashed").await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let lock = SqliteRunLock::new(pool.clone(), Duration::from_secs(60));
        lock.acquire("t1", "worker").await.unwrap();
        let row = run_locks::get_lock(&pool, "t1").unwrap().unwrap();
        assert_eq!(row.holder, "worker");
    }

    #[tokio::test]
    async fn test_renew_extends_only_own_lease() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let lock = SqliteRunLock::new(pool.clone(), Duration::from_secs(60));
        lock.acquire("t1", "worker-1").await.unwrap();
        let before = run_locks::get_lock(&pool, "t1").unwrap().unwrap().expires_at;

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(lock.renew("t1", "worker-1").await.unwrap());
        let after = run_locks::get_lock(&pool, "t1").unwrap().unwrap().expires_at;
        assert!(after > before);

        assert!(!lock.renew("t1", "worker-2").await.unwrap());
        assert!(!lock.renew("t2", "worker-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_by_non_holder_is_ignored() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let lock = SqliteRunLock::new(pool, Duration::from_secs(60));
        lock.acquire("t1", "worker-1").await.unwrap();

        lock.release("t1", "intruder").await.unwrap();
        assert!(!lock.try_acquire("t1", "worker-2").await.unwrap());
    }
}
