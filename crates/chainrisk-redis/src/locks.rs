//! Per-tenant run leases.
//!
//! A lease is a key holding the holder token with a millisecond TTL. Taking it
//! uses `SET NX PX`; renewing and releasing compare the token first so a run
//! whose lease already expired cannot drop a successor's lease.

use std::time::Duration;

use tracing::debug;

use crate::client::{RedisPool, RedisResult};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Redis key of a tenant's run lease.
pub fn lease_key(tenant_id: &str) -> String {
    format!("chainrisk:{}:run_lock", tenant_id)
}

fn lease_millis(lease: Duration) -> u64 {
    u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Try to take a tenant's lease. Returns false when another holder has it.
pub async fn acquire_lease(
    pool: &RedisPool,
    tenant_id: &str,
    holder: &str,
    lease: Duration,
) -> RedisResult<bool> {
    let mut conn = pool.clone();
    let key = lease_key(tenant_id);
    let reply: Option<String> = redis::cmd("SET")
        .arg(&key)
        .arg(holder)
        .arg("NX")
        .arg("PX")
        .arg(lease_millis(lease))
        .query_async(&mut conn)
        .await?;

    debug!(tenant_id, holder, acquired = reply.is_some(), "Redis lease attempt");
    Ok(reply.is_some())
}

/// Extend a lease the caller still holds.
pub async fn renew_lease(
    pool: &RedisPool,
    tenant_id: &str,
    holder: &str,
    lease: Duration,
) -> RedisResult<bool> {
    let mut conn = pool.clone();
    let renewed: i64 = redis::Script::new(RENEW_SCRIPT)
        .key(lease_key(tenant_id))
        .arg(holder)
        .arg(lease_millis(lease))
        .invoke_async(&mut conn)
        .await?;
    Ok(renewed == 1)
}

/// Release a lease if the caller still holds it.
pub async fn release_lease(pool: &RedisPool, tenant_id: &str, holder: &str) -> RedisResult<bool> {
    let mut conn = pool.clone();
    let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
        .key(lease_key(tenant_id))
        .arg(holder)
        .invoke_async(&mut conn)
        .await?;
    Ok(deleted == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_key_is_tenant_scoped() {
        assert_eq!(lease_key("t1"), "chainrisk:t1:run_lock");
        assert_ne!(lease_key("t1"), lease_key("t2"));
    }

    #[test]
    fn test_lease_millis_never_zero() {
        assert_eq!(lease_millis(Duration::from_micros(10)), 1);
        assert_eq!(lease_millis(Duration::from_secs(2)), 2_000);
    }
}
