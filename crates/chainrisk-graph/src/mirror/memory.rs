//! In-memory mirror.
//!
//! Used by tests and by the CLI when Neo4j is disabled. Writes can be made to
//! fail on demand to exercise the sync failure path.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EdgeKind, GraphMirror, MirrorEdge, MirrorVertex};
use crate::client::GraphCounts;

type EdgeKey = (String, String, EdgeKind, String);

/// Mirror held in process memory.
#[derive(Default)]
pub struct MemoryMirror {
    vertices: RwLock<BTreeMap<String, MirrorVertex>>,
    /// Keyed like the Neo4j MERGE pattern; value is the connection ID.
    edges: RwLock<BTreeMap<EdgeKey, String>>,
    fail_writes: AtomicBool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return an error until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// All mirrored edges, in key order.
    pub async fn edges(&self) -> Vec<MirrorEdge> {
        self.edges
            .read()
            .await
            .iter()
            .map(|((from, to, kind, sc), cid)| MirrorEdge {
                from_id: from.clone(),
                to_id: to.clone(),
                kind: *kind,
                supply_chain_id: sc.clone(),
                connection_id: cid.clone(),
            })
            .collect()
    }

    pub async fn vertex(&self, id: &str) -> Option<MirrorVertex> {
        self.vertices.read().await.get(id).cloned()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("mirror unavailable");
        }
        Ok(())
    }

    async fn collect(&self, ids: HashSet<String>) -> Vec<MirrorVertex> {
        let vertices = self.vertices.read().await;
        let mut out: Vec<MirrorVertex> = ids.iter().filter_map(|id| vertices.get(id).cloned()).collect();
        out.sort();
        out
    }

    /// Neighbours of `vertex_id` along `outgoing` edges leaving it and
    /// `incoming` edges entering it.
    async fn neighbours(&self, vertex_id: &str, outgoing: EdgeKind, incoming: EdgeKind) -> HashSet<String> {
        let edges = self.edges.read().await;
        let mut ids = HashSet::new();
        for (from, to, kind, _) in edges.keys() {
            if from == vertex_id && *kind == outgoing {
                ids.insert(to.clone());
            }
            if to == vertex_id && *kind == incoming {
                ids.insert(from.clone());
            }
        }
        ids
    }
}

#[async_trait]
impl GraphMirror for MemoryMirror {
    async fn upsert_vertex(&self, vertex: &MirrorVertex) -> Result<()> {
        self.check_writable()?;
        self.vertices.write().await.insert(vertex.id.clone(), vertex.clone());
        Ok(())
    }

    async fn upsert_edge(&self, edge: &MirrorEdge) -> Result<()> {
        self.check_writable()?;
        {
            let vertices = self.vertices.read().await;
            // Same as a MATCH that finds nothing: the MERGE is a no-op.
            if !vertices.contains_key(&edge.from_id) || !vertices.contains_key(&edge.to_id) {
                return Ok(());
            }
        }
        let key = (
            edge.from_id.clone(),
            edge.to_id.clone(),
            edge.kind,
            edge.supply_chain_id.clone(),
        );
        self.edges.write().await.insert(key, edge.connection_id.clone());
        Ok(())
    }

    async fn remove_edge(
        &self,
        from_id: &str,
        to_id: &str,
        kind: EdgeKind,
        supply_chain_id: &str,
    ) -> Result<bool> {
        self.check_writable()?;
        let key = (
            from_id.to_string(),
            to_id.to_string(),
            kind,
            supply_chain_id.to_string(),
        );
        Ok(self.edges.write().await.remove(&key).is_some())
    }

    async fn disconnect_all(&self, vertex_id: &str) -> Result<usize> {
        self.check_writable()?;
        let mut edges = self.edges.write().await;
        let before = edges.len();
        edges.retain(|(from, to, _, _), _| from != vertex_id && to != vertex_id);
        Ok(before - edges.len())
    }

    async fn delete_vertex(&self, vertex_id: &str) -> Result<bool> {
        self.disconnect_all(vertex_id).await?;
        Ok(self.vertices.write().await.remove(vertex_id).is_some())
    }

    async fn clear_tenant(&self, tenant_id: &str) -> Result<()> {
        self.check_writable()?;
        let removed: HashSet<String> = {
            let mut vertices = self.vertices.write().await;
            let ids: HashSet<String> = vertices
                .values()
                .filter(|v| v.tenant_id == tenant_id)
                .map(|v| v.id.clone())
                .collect();
            vertices.retain(|id, _| !ids.contains(id));
            ids
        };
        self.edges
            .write()
            .await
            .retain(|(from, to, _, _), _| !removed.contains(from) && !removed.contains(to));
        Ok(())
    }

    async fn counts(&self) -> Result<GraphCounts> {
        Ok(GraphCounts {
            nodes: self.vertices.read().await.len(),
            relationships: self.edges.read().await.len(),
        })
    }

    async fn one_hop_children(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
        let ids = self
            .neighbours(vertex_id, EdgeKind::BuysFrom, EdgeKind::SuppliesTo)
            .await;
        Ok(self.collect(ids).await)
    }

    async fn one_hop_parents(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
        let ids = self
            .neighbours(vertex_id, EdgeKind::SuppliesTo, EdgeKind::BuysFrom)
            .await;
        Ok(self.collect(ids).await)
    }

    async fn all_connected(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
        let edges = self.edges.read().await;
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(vertex_id.to_string());
        let mut queue = VecDeque::from([vertex_id.to_string()]);

        while let Some(current) = queue.pop_front() {
            for (from, to, _, _) in edges.keys() {
                let next = if *from == current {
                    to
                } else if *to == current {
                    from
                } else {
                    continue;
                };
                if seen.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
        drop(edges);

        seen.remove(vertex_id);
        Ok(self.collect(seen).await)
    }

    async fn terminal_vertices(&self, supply_chain_id: &str) -> Result<Vec<MirrorVertex>> {
        let candidates: Vec<MirrorVertex> = self
            .vertices
            .read()
            .await
            .values()
            .filter(|v| v.supply_chain_id == supply_chain_id)
            .cloned()
            .collect();

        let mut out = Vec::new();
        for vertex in candidates {
            let suppliers = self
                .neighbours(&vertex.id, EdgeKind::BuysFrom, EdgeKind::SuppliesTo)
                .await;
            if suppliers.is_empty() {
                out.push(vertex);
            }
        }
        Ok(out)
    }
}
