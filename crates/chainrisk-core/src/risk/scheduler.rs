//! Periodic and on-demand scoring runs.
//!
//! The scheduler scores every tenant on a fixed interval and also accepts
//! [`ScoreTrigger`]s, for example after a connection or baseline change. Each
//! tenant run holds the tenant's [`RunLock`] and executes on the blocking
//! pool; different tenants run in parallel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chainrisk_db::{EventReceiver, StoreEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::engine::{CancelFlag, RiskEngine};
use super::lock::RunLock;
use super::model::RunReport;
use crate::error::{ChainError, ChainResult};

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between full passes over all tenants.
    pub interval_secs: u64,
    /// Lease length of the per-tenant run lock.
    pub lease_secs: u64,
    /// Queue a run for a tenant whenever its connections or baselines change.
    pub trigger_on_events: bool,
    /// How often a daemon reads the store event log for writes made by other
    /// processes.
    pub event_poll_millis: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            lease_secs: 900,
            trigger_on_events: true,
            event_poll_millis: 1000,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs.max(1))
    }

    pub fn event_poll(&self) -> Duration {
        Duration::from_millis(self.event_poll_millis.max(50))
    }
}

/// An on-demand run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreTrigger {
    Tenant(String),
    AllTenants,
}

/// Drives [`RiskEngine`] runs under a [`RunLock`].
#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<RiskEngine>,
    lock: Arc<dyn RunLock>,
    config: SchedulerConfig,
    holder: String,
    cancel: CancelFlag,
}

impl Scheduler {
    pub fn new(engine: Arc<RiskEngine>, lock: Arc<dyn RunLock>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            lock,
            config,
            holder: format!("scheduler-{}", Uuid::new_v4()),
            cancel: CancelFlag::new(),
        }
    }

    /// Flag shared with every run this scheduler starts.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Tick on the interval and serve triggers until the trigger channel
    /// closes or the scheduler is cancelled.
    pub async fn run(self, mut triggers: mpsc::Receiver<ScoreTrigger>) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.config.interval_secs, holder = %self.holder, "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_all().await;
                }
                trigger = triggers.recv() => match trigger {
                    Some(ScoreTrigger::Tenant(tenant_id)) => {
                        // Conflicts and failures are already logged.
                        let _ = self.run_tenant(&tenant_id).await;
                    }
                    Some(ScoreTrigger::AllTenants) => {
                        self.run_all().await;
                    }
                    None => break,
                },
            }
            if self.cancel.is_cancelled() {
                break;
            }
        }

        info!("Scheduler stopped");
    }

    /// Run every tenant in parallel. Returns one result per tenant.
    pub async fn run_all(&self) -> Vec<ChainResult<RunReport>> {
        let tenants = match self.tenant_ids() {
            Ok(tenants) => tenants,
            Err(e) => {
                error!(error = %e, "Failed to list tenants");
                return vec![Err(e)];
            }
        };

        let mut join_set = JoinSet::new();
        for tenant_id in tenants {
            let scheduler = self.clone();
            join_set.spawn(async move { scheduler.run_tenant(&tenant_id).await });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(error = %e, "Scoring task panicked");
                    results.push(Err(ChainError::TaskFailed(e.to_string())));
                }
            }
        }
        results
    }

    /// Run one tenant under its lease. A held lease skips the run with
    /// [`ChainError::RunConflict`]; the lease is released whatever the outcome.
    pub async fn run_tenant(&self, tenant_id: &str) -> ChainResult<RunReport> {
        if let Err(e) = self.lock.acquire(tenant_id, &self.holder).await {
            match &e {
                ChainError::RunConflict(_) => info!(tenant_id, "Run already in progress, skipping"),
                other => warn!(tenant_id, error = %other, "Failed to take run lock"),
            }
            return Err(e);
        }

        // Own flag so a lost lease stops only this run.
        let cancel = self.cancel.child();
        let engine = self.engine.clone();
        let run_cancel = cancel.clone();
        let tenant = tenant_id.to_string();
        let task = tokio::task::spawn_blocking(move || engine.run_for_tenant(&tenant, &run_cancel));
        let outcome = self.hold_lease(tenant_id, &cancel, task).await;

        if let Err(e) = self.lock.release(tenant_id, &self.holder).await {
            warn!(tenant_id, error = %e, "Failed to release run lock");
        }

        match outcome {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => {
                error!(tenant_id, error = %e, "Scoring run failed");
                Err(e)
            }
            Err(e) => {
                error!(tenant_id, error = %e, "Scoring task panicked");
                Err(ChainError::TaskFailed(e.to_string()))
            }
        }
    }

    /// Drive `task` to completion while renewing the tenant's lease every
    /// third of its length. Once the lease is lost, `cancel` is set so the
    /// run stops before another holder's run overlaps it for long.
    async fn hold_lease<F: Future>(&self, tenant_id: &str, cancel: &CancelFlag, task: F) -> F::Output {
        tokio::pin!(task);
        let mut heartbeat = tokio::time::interval(self.config.lease() / 3);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                output = &mut task => return output,
                _ = heartbeat.tick() => match self.lock.renew(tenant_id, &self.holder).await {
                    Ok(true) => debug!(tenant_id, "Run lease renewed"),
                    Ok(false) => {
                        if !cancel.is_cancelled() {
                            warn!(tenant_id, "Run lease lost while scoring, cancelling run");
                            cancel.cancel();
                        }
                    }
                    Err(e) => warn!(tenant_id, error = %e, "Failed to renew run lease"),
                },
            }
        }
    }

    fn tenant_ids(&self) -> ChainResult<Vec<String>> {
        let tenants = crate::tenant::list_tenants(self.engine.pool())?;
        Ok(tenants.into_iter().map(|t| t.id).collect())
    }
}

/// Turn store events into per-tenant triggers.
///
/// Runs until either channel closes. A lagged receiver asks for a full pass.
pub fn spawn_event_bridge(mut events: EventReceiver, triggers: mpsc::Sender<ScoreTrigger>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let trigger = match events.recv().await {
                Ok(StoreEvent::ConnectionUpserted { tenant_id, .. })
                | Ok(StoreEvent::VertexRetired { tenant_id, .. })
                | Ok(StoreEvent::BaselineUpdated { tenant_id, .. }) => ScoreTrigger::Tenant(tenant_id),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Scheduler event bridge lagged");
                    ScoreTrigger::AllTenants
                }
                Err(RecvError::Closed) => break,
            };
            debug!(?trigger, "Queueing scoring run");
            if triggers.send(trigger).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::model::ActorRole;
    use crate::risk::lock::SqliteRunLock;
    use crate::risk::model::ScoringConfig;

    fn scheduler() -> (chainrisk_db::DbPool, Scheduler) {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let engine = Arc::new(RiskEngine::new(pool.clone(), ScoringConfig::default()));
        let lock = Arc::new(SqliteRunLock::new(pool.clone(), Duration::from_secs(60)));
        (pool, Scheduler::new(engine, lock, SchedulerConfig::default()))
    }

    #[tokio::test]
    async fn test_held_lock_skips_run() {
        let (pool, scheduler) = scheduler();
        let tenant = crate::tenant::create_tenant(&pool, "Acme", false).unwrap();

        let other = SqliteRunLock::new(pool.clone(), Duration::from_secs(60));
        other.acquire(&tenant.id, "someone-else").await.unwrap();

        let err = scheduler.run_tenant(&tenant.id).await.unwrap_err();
        assert!(matches!(err, ChainError::RunConflict(_)));
        assert!(chainrisk_db::queries::score_runs::list_runs(&pool, &tenant.id, 10)
            .unwrap()
            .is_empty());
    }

    /// Grants every lease, then reports it lost on the first renewal.
    struct LosingLock;

    #[async_trait::async_trait]
    impl RunLock for LosingLock {
        async fn try_acquire(&self, _tenant_id: &str, _holder: &str) -> ChainResult<bool> {
            Ok(true)
        }

        async fn renew(&self, _tenant_id: &str, _holder: &str) -> ChainResult<bool> {
            Ok(false)
        }

        async fn release(&self, _tenant_id: &str, _holder: &str) -> ChainResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lost_lease_cancels_only_that_run() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let engine = Arc::new(RiskEngine::new(pool, ScoringConfig::default()));
        let config = SchedulerConfig {
            lease_secs: 1,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(engine, Arc::new(LosingLock), config);

        let cancel = scheduler.cancel_flag().child();
        let watched = cancel.clone();
        let cancelled = scheduler
            .hold_lease("t1", &cancel, async move {
                for _ in 0..100 {
                    if watched.is_cancelled() {
                        return true;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                false
            })
            .await;

        assert!(cancelled);
        assert!(!scheduler.cancel_flag().is_cancelled());
    }

    #[tokio::test]
    async fn test_run_all_releases_locks() {
        let (pool, scheduler) = scheduler();
        crate::tenant::create_tenant(&pool, "One", false).unwrap();
        crate::tenant::create_tenant(&pool, "Two", false).unwrap();

        let results = scheduler.run_all().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));

        // Locks were released, so a second pass runs too.
        assert!(scheduler.run_all().await.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_event_bridge_maps_tenant() {
        let pool = chainrisk_db::init_in_memory().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_event_bridge(pool.subscribe(), tx);

        pool.publish(StoreEvent::BaselineUpdated {
            tenant_id: "t1".to_string(),
            actor_id: "a1".to_string(),
        });

        assert_eq!(rx.recv().await, Some(ScoreTrigger::Tenant("t1".to_string())));
        handle.abort();
    }

    #[tokio::test]
    async fn test_write_from_another_process_triggers_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainrisk.db");
        let daemon = chainrisk_db::init_pool(&path).unwrap();
        let cli = chainrisk_db::init_pool(&path).unwrap();

        let mut relay = chainrisk_db::EventRelay::new(daemon.clone()).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_event_bridge(daemon.subscribe(), tx);

        let tenant = crate::tenant::create_tenant(&cli, "Acme", false).unwrap();
        let actor = crate::actor::create_actor(&cli, &tenant.id, "Farm", ActorRole::Producer, None).unwrap();
        crate::actor::set_baseline(&cli, &actor.id, Some(40.0)).unwrap();

        assert_eq!(relay.poll().unwrap(), 1);
        assert_eq!(rx.recv().await, Some(ScoreTrigger::Tenant(tenant.id)));
        handle.abort();
    }

    #[tokio::test]
    async fn test_scheduler_stops_when_triggers_close() {
        let (pool, scheduler) = scheduler();
        let tenant = crate::tenant::create_tenant(&pool, "Acme", false).unwrap();
        let (tx, rx) = mpsc::channel(8);

        tx.send(ScoreTrigger::Tenant(tenant.id.clone())).await.unwrap();
        drop(tx);
        scheduler.run(rx).await;

        assert!(!chainrisk_db::queries::score_runs::list_runs(&pool, &tenant.id, 10)
            .unwrap()
            .is_empty());
    }
}
