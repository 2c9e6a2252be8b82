//! Database query implementations.

pub mod actors;
pub mod connections;
pub mod lineage;
pub mod run_locks;
pub mod score_runs;
pub mod store_events;
pub mod supply_chains;
pub mod sync_state;
pub mod tenants;
pub mod vertices;
