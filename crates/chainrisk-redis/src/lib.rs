//! chainrisk Redis layer
//!
//! Distributed per-tenant run leases for deployments where more than one
//! scheduler process shares a tenant set.

pub mod client;
pub mod locks;

pub use client::{init_pool, RedisError, RedisPool, RedisResult};
pub use locks::{acquire_lease, lease_key, release_lease, renew_lease};
