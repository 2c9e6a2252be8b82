//! Follows the store event log written by other processes.
//!
//! The broadcast channel only reaches subscribers in the publishing process.
//! A long-running daemon polls the log with an [`EventRelay`] and rebroadcasts
//! foreign events locally, so its graph syncer and scheduler react to writes
//! made by short-lived CLI invocations.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::broadcast::StoreEvent;
use crate::pool::{DbPool, DbResult};
use crate::queries::store_events;

const BATCH: i64 = 500;

/// Logged events older than this are pruned.
const RETENTION_HOURS: i64 = 24;

pub struct EventRelay {
    pool: DbPool,
    cursor: i64,
}

impl EventRelay {
    /// Start at the end of the log. Earlier events are covered by the
    /// daemon's startup sync and first scoring pass.
    pub fn new(pool: DbPool) -> DbResult<Self> {
        let cursor = store_events::latest_seq(&pool)?;
        Ok(Self { pool, cursor })
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Rebroadcast every foreign event logged since the last poll. Returns how
    /// many were relayed.
    pub fn poll(&mut self) -> DbResult<usize> {
        let mut relayed = 0;
        loop {
            let rows = store_events::list_after(&self.pool, self.cursor, self.pool.origin(), BATCH)?;
            let Some(last) = rows.last() else {
                break;
            };
            self.cursor = last.seq;
            let full = rows.len() as i64 == BATCH;

            for row in rows {
                match serde_json::from_str::<StoreEvent>(&row.payload) {
                    Ok(event) => {
                        self.pool.broadcast(event);
                        relayed += 1;
                    }
                    Err(e) => warn!(seq = row.seq, error = %e, "Skipping unreadable store event"),
                }
            }
            if !full {
                break;
            }
        }
        if relayed > 0 {
            debug!(relayed, cursor = self.cursor, "Relayed store events");
        }
        Ok(relayed)
    }

    /// Drop log entries past the retention window.
    pub fn prune(&self) -> DbResult<usize> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::hours(RETENTION_HOURS)).to_rfc3339();
        store_events::prune_before(&self.pool, &cutoff)
    }

    /// Poll on a fixed interval until the task is aborted.
    pub fn spawn(mut self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks: u64 = 0;
            loop {
                ticker.tick().await;
                if let Err(e) = self.poll() {
                    warn!(error = %e, "Failed to read store event log");
                }
                ticks += 1;
                // Roughly hourly at the default poll interval.
                if ticks % 3600 == 0 {
                    if let Err(e) = self.prune() {
                        warn!(error = %e, "Failed to prune store event log");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_file() -> (tempfile::TempDir, DbPool, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainrisk.db");
        let daemon = crate::init_pool(&path).unwrap();
        let cli = crate::init_pool(&path).unwrap();
        (dir, daemon, cli)
    }

    #[tokio::test]
    async fn test_relays_events_from_another_handle() {
        let (_dir, daemon, cli) = shared_file();
        let mut relay = EventRelay::new(daemon.clone()).unwrap();
        let mut rx = daemon.subscribe();

        cli.publish(StoreEvent::VertexRetired {
            tenant_id: "t1".to_string(),
            vertex_id: "v1".to_string(),
        });

        assert_eq!(relay.poll().unwrap(), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            StoreEvent::VertexRetired {
                tenant_id: "t1".to_string(),
                vertex_id: "v1".to_string(),
            }
        );
        assert_eq!(relay.poll().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_own_events_are_not_relayed_twice() {
        let (_dir, daemon, _cli) = shared_file();
        let mut relay = EventRelay::new(daemon.clone()).unwrap();
        let mut rx = daemon.subscribe();

        daemon.publish(StoreEvent::BaselineUpdated {
            tenant_id: "t1".to_string(),
            actor_id: "a1".to_string(),
        });

        assert_eq!(relay.poll().unwrap(), 0);
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_starts_after_existing_events() {
        let (_dir, daemon, cli) = shared_file();
        cli.publish(StoreEvent::BaselineUpdated {
            tenant_id: "t1".to_string(),
            actor_id: "a1".to_string(),
        });

        let mut relay = EventRelay::new(daemon).unwrap();
        assert!(relay.cursor() > 0);
        assert_eq!(relay.poll().unwrap(), 0);
    }
}
