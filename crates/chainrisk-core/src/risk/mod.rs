//! Risk scoring: the propagation engine, run locks and the scheduler.

pub mod cycles;
pub mod engine;
pub mod lock;
pub mod model;
pub mod scheduler;

pub use engine::{CancelFlag, RiskEngine};
pub use lock::{RedisRunLock, RunLock, SqliteRunLock};
pub use model::{RunReport, ScoreRun, ScoringConfig, ScoringFailure, Severity, VertexScore};
pub use scheduler::{spawn_event_bridge, ScoreTrigger, Scheduler, SchedulerConfig};

use chainrisk_db::queries::score_runs;
use chainrisk_db::DbPool;

use crate::error::ChainResult;

/// Most recent runs of a tenant, newest first.
pub fn list_runs(pool: &DbPool, tenant_id: &str, limit: usize) -> ChainResult<Vec<ScoreRun>> {
    crate::tenant::get_tenant(pool, tenant_id)?;
    let rows = score_runs::list_runs(pool, tenant_id, i64::try_from(limit).unwrap_or(i64::MAX))?;
    Ok(rows.into_iter().map(ScoreRun::from_row).collect())
}
