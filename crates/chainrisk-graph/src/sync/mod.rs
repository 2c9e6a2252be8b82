//! Store to mirror synchronization.
//!
//! Reads connections from SQLite and projects them into the mirror one at a
//! time. Sync state is tracked per connection so a failed or missed projection
//! is retried by `sync_pending`. Nothing here ever writes mirror data back into
//! the store.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chainrisk_db::queries::connections::{self, ConnectionRow};
use chainrisk_db::queries::{actors, supply_chains, sync_state, tenants, vertices};
use chainrisk_db::{DbPool, EventReceiver, StoreEvent};

use crate::mirror::{EdgeKind, GraphMirror, MirrorEdge, MirrorVertex};

/// Result of a sync operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub vertices_upserted: usize,
    pub relationships_upserted: usize,
    pub relationships_removed: usize,
    pub failed: usize,
}

impl SyncResult {
    pub fn merge(&mut self, other: &SyncResult) {
        self.vertices_upserted += other.vertices_upserted;
        self.relationships_upserted += other.relationships_upserted;
        self.relationships_removed += other.relationships_removed;
        self.failed += other.failed;
    }
}

/// A connection that could not be projected. Recorded, never propagated to
/// the connection workflow.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Sync of connection {connection_id} failed: {message}")]
pub struct SyncFailure {
    pub connection_id: String,
    pub message: String,
}

/// One-directional projector from the store into a [`GraphMirror`].
#[derive(Clone)]
pub struct GraphSyncer {
    db: DbPool,
    mirror: Arc<dyn GraphMirror>,
    /// Record outcomes in `graph_sync_state`.
    track_state: bool,
}

impl GraphSyncer {
    pub fn new(db: DbPool, mirror: Arc<dyn GraphMirror>) -> Self {
        Self {
            db,
            mirror,
            track_state: true,
        }
    }

    /// A syncer for a throwaway mirror. Leaves `graph_sync_state` alone so
    /// the persistent mirror's pending set is not disturbed.
    pub fn detached(db: DbPool, mirror: Arc<dyn GraphMirror>) -> Self {
        Self {
            db,
            mirror,
            track_state: false,
        }
    }

    pub fn mirror(&self) -> &Arc<dyn GraphMirror> {
        &self.mirror
    }

    /// Project one connection. Safe to repeat.
    pub async fn sync_connection(&self, row: &ConnectionRow) -> Result<SyncResult, SyncFailure> {
        match self.project(row).await {
            Ok(result) => {
                if self.track_state {
                    if let Err(e) = sync_state::mark_synced(&self.db, &row.id) {
                        warn!(connection_id = %row.id, error = %e, "Failed to record sync state");
                    }
                }
                debug!(
                    connection_id = %row.id,
                    upserted = result.relationships_upserted,
                    removed = result.relationships_removed,
                    "Connection synced"
                );
                Ok(result)
            }
            Err(e) => {
                let failure = SyncFailure {
                    connection_id: row.id.clone(),
                    message: format!("{:#}", e),
                };
                if self.track_state {
                    if let Err(db_err) = sync_state::mark_failed(&self.db, &row.id, &failure.message) {
                        warn!(connection_id = %row.id, error = %db_err, "Failed to record sync failure");
                    }
                }
                warn!(connection_id = %row.id, error = %failure.message, "Graph sync failed");
                Err(failure)
            }
        }
    }

    /// Load a connection from the store and project it.
    pub async fn sync_connection_id(&self, connection_id: &str) -> Result<SyncResult, SyncFailure> {
        let row = connections::get_connection(&self.db, connection_id).map_err(|e| SyncFailure {
            connection_id: connection_id.to_string(),
            message: e.to_string(),
        })?;
        self.sync_connection(&row).await
    }

    /// Retry every connection of a tenant that failed or was never synced.
    pub async fn sync_pending(&self, tenant_id: &str) -> Result<SyncResult> {
        let pending = sync_state::list_pending(&self.db, tenant_id)
            .map_err(|e| anyhow!("Failed to list pending connections: {}", e))?;

        let mut total = SyncResult::default();
        for connection_id in &pending {
            match self.sync_connection_id(connection_id).await {
                Ok(result) => total.merge(&result),
                Err(_) => total.failed += 1,
            }
        }

        if !pending.is_empty() {
            info!(tenant_id, pending = pending.len(), failed = total.failed, "Pending connections synced");
        }
        Ok(total)
    }

    /// Drop the tenant's mirror and project every connection again.
    pub async fn rebuild(&self, tenant_id: &str) -> Result<SyncResult> {
        info!(tenant_id, "Rebuilding graph mirror");

        self.mirror
            .clear_tenant(tenant_id)
            .await
            .context("Failed to clear tenant mirror")?;

        let rows = connections::list_tenant_connections(&self.db, tenant_id)
            .map_err(|e| anyhow!("Failed to list connections: {}", e))?;

        let mut total = SyncResult::default();
        for row in &rows {
            match self.sync_connection(row).await {
                Ok(result) => total.merge(&result),
                Err(_) => total.failed += 1,
            }
        }

        info!(
            tenant_id,
            connections = rows.len(),
            vertices = total.vertices_upserted,
            relationships = total.relationships_upserted,
            failed = total.failed,
            "Graph mirror rebuilt"
        );
        Ok(total)
    }

    /// Remove every mirrored relationship of a retired vertex.
    pub async fn retire_vertex(&self, vertex_id: &str) -> Result<usize> {
        let removed = self.mirror.disconnect_all(vertex_id).await?;
        debug!(vertex_id, removed, "Vertex disconnected in mirror");
        Ok(removed)
    }

    /// Apply one store event.
    pub async fn handle_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::ConnectionUpserted { connection_id, .. } => {
                // Failure already recorded for sync_pending.
                let _ = self.sync_connection_id(connection_id).await;
            }
            StoreEvent::VertexRetired { vertex_id, .. } => {
                if let Err(e) = self.retire_vertex(vertex_id).await {
                    warn!(vertex_id, error = %e, "Failed to disconnect retired vertex");
                }
            }
            // Baselines are scoring input only; the mirror carries topology.
            StoreEvent::BaselineUpdated { .. } => {}
        }
    }

    /// Consume store events until the channel closes.
    pub async fn run_listener(&self, mut rx: EventReceiver) {
        loop {
            match rx.recv().await {
                Ok(event) => self.handle_event(&event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Graph syncer lagged, falling back to pending sync");
                    self.sync_all_pending().await;
                }
                Err(RecvError::Closed) => {
                    debug!("Store event channel closed");
                    break;
                }
            }
        }
    }

    /// Subscribe to the store and run the listener on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        let rx = self.db.subscribe();
        tokio::spawn(async move { self.run_listener(rx).await })
    }

    /// `sync_pending` for every tenant. Errors are logged per tenant.
    pub async fn sync_all_pending(&self) -> SyncResult {
        let mut total = SyncResult::default();
        let tenants = match tenants::list_tenants(&self.db) {
            Ok(tenants) => tenants,
            Err(e) => {
                warn!(error = %e, "Failed to list tenants for pending sync");
                return total;
            }
        };
        for tenant in &tenants {
            match self.sync_pending(&tenant.id).await {
                Ok(result) => total.merge(&result),
                Err(e) => warn!(tenant_id = %tenant.id, error = %e, "Pending sync failed"),
            }
        }
        total
    }

    async fn project(&self, row: &ConnectionRow) -> Result<SyncResult> {
        let mut result = SyncResult::default();

        let tenant_id = supply_chains::get_supply_chain(&self.db, &row.supply_chain_id)
            .map_err(|e| anyhow!("Failed to load supply chain: {}", e))?
            .tenant_id;
        let source = self.mirror_vertex(&row.source_id, &row.supply_chain_id, &tenant_id)?;
        let target = self.mirror_vertex(&row.target_id, &row.supply_chain_id, &tenant_id)?;

        self.mirror.upsert_vertex(&source.0).await?;
        self.mirror.upsert_vertex(&target.0).await?;
        result.vertices_upserted += 2;

        let live = row.status != "REVOKED" && source.1 && target.1;
        for kind in EdgeKind::ALL {
            let represented = match kind {
                EdgeKind::BuysFrom => row.is_supplier,
                EdgeKind::SuppliesTo => row.is_buyer,
            };

            if live && represented {
                let edge = MirrorEdge {
                    from_id: source.0.id.clone(),
                    to_id: target.0.id.clone(),
                    kind,
                    supply_chain_id: row.supply_chain_id.clone(),
                    connection_id: row.id.clone(),
                };
                self.mirror.upsert_edge(&edge).await?;
                result.relationships_upserted += 1;
            } else if self
                .mirror
                .remove_edge(&source.0.id, &target.0.id, kind, &row.supply_chain_id)
                .await?
            {
                result.relationships_removed += 1;
            }
        }

        Ok(result)
    }

    /// Mirror vertex for an endpoint, with whether the store vertex is active.
    fn mirror_vertex(&self, actor_id: &str, supply_chain_id: &str, tenant_id: &str) -> Result<(MirrorVertex, bool)> {
        let vertex = vertices::find_vertex(&self.db, actor_id, supply_chain_id)
            .map_err(|e| anyhow!("Failed to load vertex: {}", e))?
            .ok_or_else(|| anyhow!("No vertex for actor {} in {}", actor_id, supply_chain_id))?;
        let actor = actors::get_actor(&self.db, actor_id)
            .map_err(|e| anyhow!("Failed to load actor: {}", e))?;

        Ok((
            MirrorVertex {
                id: vertex.id,
                actor_id: actor.id,
                supply_chain_id: supply_chain_id.to_string(),
                tenant_id: tenant_id.to_string(),
                kind: actor.role,
            },
            vertex.active,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryMirror;
    use chainrisk_db::queries::connections::{insert_connection, update_status};

    fn seed() -> DbPool {
        let pool = chainrisk_db::init_in_memory().unwrap();
        tenants::create_tenant(&pool, "t1", "Tenant", false).unwrap();
        supply_chains::create_supply_chain(&pool, "sc1", "t1", "Cocoa").unwrap();
        actors::create_actor(&pool, "farm", "t1", "Farm", "PRODUCER", None).unwrap();
        actors::create_actor(&pool, "coop", "t1", "Coop", "COMPANY", None).unwrap();
        pool.with_conn(|conn| {
            vertices::ensure_vertex(conn, "v-farm", "farm", "sc1")?;
            vertices::ensure_vertex(conn, "v-coop", "coop", "sc1")?;
            Ok(())
        })
        .unwrap();
        pool
    }

    fn insert(pool: &DbPool, id: &str, is_buyer: bool, is_supplier: bool) -> ConnectionRow {
        let now = chainrisk_db::now_rfc3339();
        let row = ConnectionRow {
            id: id.to_string(),
            source_id: "coop".to_string(),
            target_id: "farm".to_string(),
            supply_chain_id: "sc1".to_string(),
            is_buyer,
            is_supplier,
            status: "APPROVED".to_string(),
            initiation: "MANUAL".to_string(),
            paired_with: None,
            created_at: now.clone(),
            updated_at: now,
        };
        pool.with_conn(|conn| insert_connection(conn, &row)).unwrap();
        row
    }

    fn syncer(pool: &DbPool) -> (GraphSyncer, Arc<MemoryMirror>) {
        let mirror = Arc::new(MemoryMirror::new());
        (GraphSyncer::new(pool.clone(), mirror.clone()), mirror)
    }

    #[tokio::test]
    async fn test_sync_twice_yields_one_relationship() {
        let pool = seed();
        let row = insert(&pool, "c1", false, true);
        let (syncer, mirror) = syncer(&pool);

        syncer.sync_connection(&row).await.unwrap();
        syncer.sync_connection(&row).await.unwrap();

        let edges = mirror.edges().await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::BuysFrom);
        assert_eq!(edges[0].from_id, "v-coop");
        assert_eq!(edges[0].to_id, "v-farm");
        assert_eq!(edges[0].connection_id, "c1");
        assert_eq!(mirror.counts().await.unwrap().nodes, 2);

        let children = mirror.one_hop_children("v-coop").await.unwrap();
        assert_eq!(children[0].kind, "PRODUCER");
    }

    #[tokio::test]
    async fn test_revoked_connection_loses_relationships() {
        let pool = seed();
        let row = insert(&pool, "c1", true, true);
        let (syncer, mirror) = syncer(&pool);

        let first = syncer.sync_connection(&row).await.unwrap();
        assert_eq!(first.relationships_upserted, 2);

        pool.with_conn(|conn| update_status(conn, "c1", "REVOKED", &chainrisk_db::now_rfc3339()))
            .unwrap();
        let second = syncer.sync_connection_id("c1").await.unwrap();
        assert_eq!(second.relationships_removed, 2);
        assert!(mirror.edges().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_retried() {
        let pool = seed();
        let row = insert(&pool, "c1", false, true);
        let (syncer, mirror) = syncer(&pool);

        mirror.set_fail_writes(true);
        let failure = syncer.sync_connection(&row).await.unwrap_err();
        assert_eq!(failure.connection_id, "c1");
        assert!(sync_state::last_error(&pool, "c1").unwrap().is_some());
        assert_eq!(sync_state::list_pending(&pool, "t1").unwrap(), vec!["c1".to_string()]);

        mirror.set_fail_writes(false);
        let retried = syncer.sync_pending("t1").await.unwrap();
        assert_eq!(retried.failed, 0);
        assert_eq!(retried.relationships_upserted, 1);
        assert_eq!(sync_state::last_error(&pool, "c1").unwrap(), None);
    }

    #[tokio::test]
    async fn test_detached_rebuild_leaves_sync_state() {
        let pool = seed();
        insert(&pool, "c1", false, true);
        let mirror = Arc::new(MemoryMirror::new());
        let syncer = GraphSyncer::detached(pool.clone(), mirror.clone());

        let result = syncer.rebuild("t1").await.unwrap();
        assert_eq!(result.relationships_upserted, 1);
        assert_eq!(mirror.edges().await.len(), 1);
        assert_eq!(sync_state::list_pending(&pool, "t1").unwrap(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_retired_vertex_event_disconnects() {
        let pool = seed();
        let row = insert(&pool, "c1", true, true);
        let (syncer, mirror) = syncer(&pool);
        syncer.sync_connection(&row).await.unwrap();

        syncer
            .handle_event(&StoreEvent::VertexRetired {
                tenant_id: "t1".to_string(),
                vertex_id: "v-farm".to_string(),
            })
            .await;

        let counts = mirror.counts().await.unwrap();
        assert_eq!(counts.relationships, 0);
        assert_eq!(counts.nodes, 2);
    }

    #[tokio::test]
    async fn test_pending_sync_disconnects_retired_vertex() {
        let pool = seed();
        let row = insert(&pool, "c1", false, true);
        let (syncer, mirror) = syncer(&pool);
        syncer.sync_connection(&row).await.unwrap();
        assert_eq!(mirror.edges().await.len(), 1);

        vertices::set_active(&pool, "v-farm", false).unwrap();
        let result = syncer.sync_pending("t1").await.unwrap();

        assert_eq!(result.relationships_removed, 1);
        assert!(mirror.edges().await.is_empty());
        assert!(sync_state::list_pending(&pool, "t1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_disconnect_is_retried() {
        let pool = seed();
        let row = insert(&pool, "c1", false, true);
        let (syncer, mirror) = syncer(&pool);
        syncer.sync_connection(&row).await.unwrap();

        vertices::set_active(&pool, "v-farm", false).unwrap();
        mirror.set_fail_writes(true);
        assert_eq!(syncer.sync_pending("t1").await.unwrap().failed, 1);
        assert_eq!(mirror.edges().await.len(), 1);

        mirror.set_fail_writes(false);
        syncer.sync_pending("t1").await.unwrap();
        assert!(mirror.edges().await.is_empty());
    }

    #[tokio::test]
    async fn test_baseline_event_leaves_mirror_alone() {
        let pool = seed();
        let (syncer, mirror) = syncer(&pool);

        syncer
            .handle_event(&StoreEvent::BaselineUpdated {
                tenant_id: "t1".to_string(),
                actor_id: "farm".to_string(),
            })
            .await;

        assert_eq!(mirror.counts().await.unwrap().nodes, 0);
    }

    #[tokio::test]
    async fn test_inactive_endpoint_is_not_connected() {
        let pool = seed();
        let row = insert(&pool, "c1", false, true);
        vertices::set_active(&pool, "v-farm", false).unwrap();
        let (syncer, mirror) = syncer(&pool);

        syncer.sync_connection(&row).await.unwrap();
        assert!(mirror.edges().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_pending_covers_every_tenant() {
        let pool = seed();
        insert(&pool, "c1", false, true);
        tenants::create_tenant(&pool, "t2", "Other", false).unwrap();
        let (syncer, mirror) = syncer(&pool);

        let result = syncer.sync_all_pending().await;
        assert_eq!(result.relationships_upserted, 1);
        assert_eq!(mirror.edges().await.len(), 1);
        assert!(sync_state::list_pending(&pool, "t1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_restores_cleared_mirror() {
        let pool = seed();
        insert(&pool, "c1", false, true);
        let (syncer, mirror) = syncer(&pool);

        syncer.rebuild("t1").await.unwrap();
        mirror.clear_tenant("t1").await.unwrap();
        assert_eq!(mirror.counts().await.unwrap().nodes, 0);

        let result = syncer.rebuild("t1").await.unwrap();
        assert_eq!(result.relationships_upserted, 1);
        assert_eq!(mirror.counts().await.unwrap().relationships, 1);
    }

    #[tokio::test]
    async fn test_listener_syncs_published_connection() {
        let pool = seed();
        insert(&pool, "c1", false, true);
        let (syncer, mirror) = syncer(&pool);
        let handle = syncer.clone().spawn();

        pool.publish(StoreEvent::ConnectionUpserted {
            tenant_id: "t1".to_string(),
            connection_id: "c1".to_string(),
        });

        let mut synced = false;
        for _ in 0..50 {
            if mirror.counts().await.unwrap().relationships == 1 {
                synced = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(synced);
    }
}
