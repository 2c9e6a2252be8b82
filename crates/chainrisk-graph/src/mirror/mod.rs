//! The graph mirror seam.
//!
//! A mirror holds one `Vertex` per (actor, supply chain) and two relationship
//! types:
//!
//! ```cypher
//! (buyer:Vertex)-[:BUYS_FROM {supply_chain_id, connection_id}]->(supplier:Vertex)
//! (supplier:Vertex)-[:SUPPLIES_TO {supply_chain_id, connection_id}]->(buyer:Vertex)
//! ```
//!
//! Both relationship types describe the same supply direction seen from either
//! end, so "suppliers of v" is out-`BUYS_FROM` plus in-`SUPPLIES_TO`.

mod memory;
mod neo4j;

pub use memory::MemoryMirror;
pub use neo4j::Neo4jMirror;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::client::GraphCounts;

/// Mirrored vertex. Carries only what traversal needs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MirrorVertex {
    pub id: String,
    pub actor_id: String,
    pub supply_chain_id: String,
    pub tenant_id: String,
    /// Actor role, `PRODUCER` or `COMPANY`.
    pub kind: String,
}

/// Relationship types of the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EdgeKind {
    /// Source buys from target.
    BuysFrom,
    /// Source supplies target.
    SuppliesTo,
}

impl EdgeKind {
    /// Both kinds, in a fixed order.
    pub const ALL: [EdgeKind; 2] = [EdgeKind::BuysFrom, EdgeKind::SuppliesTo];

    /// Neo4j relationship type.
    pub fn rel_type(&self) -> &'static str {
        match self {
            Self::BuysFrom => "BUYS_FROM",
            Self::SuppliesTo => "SUPPLIES_TO",
        }
    }
}

/// Mirrored relationship between two vertices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorEdge {
    pub from_id: String,
    pub to_id: String,
    pub kind: EdgeKind,
    pub supply_chain_id: String,
    pub connection_id: String,
}

/// Traversal-optimized projection of the connection graph.
///
/// Writes are upserts keyed so that replaying them is harmless. Reads never
/// mutate. No caller may treat a mirror read as authoritative.
#[async_trait]
pub trait GraphMirror: Send + Sync {
    /// Create or update a vertex keyed by its ID.
    async fn upsert_vertex(&self, vertex: &MirrorVertex) -> Result<()>;

    /// Create or update a relationship keyed by (from, to, kind, supply chain).
    async fn upsert_edge(&self, edge: &MirrorEdge) -> Result<()>;

    /// Remove one relationship. Returns whether it existed.
    async fn remove_edge(
        &self,
        from_id: &str,
        to_id: &str,
        kind: EdgeKind,
        supply_chain_id: &str,
    ) -> Result<bool>;

    /// Remove every relationship touching a vertex, keeping the vertex.
    async fn disconnect_all(&self, vertex_id: &str) -> Result<usize>;

    /// Delete a vertex together with its relationships.
    async fn delete_vertex(&self, vertex_id: &str) -> Result<bool>;

    /// Drop everything mirrored for a tenant.
    async fn clear_tenant(&self, tenant_id: &str) -> Result<()>;

    /// Vertex and relationship totals.
    async fn counts(&self) -> Result<GraphCounts>;

    /// Direct suppliers of a vertex.
    async fn one_hop_children(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>>;

    /// Direct buyers of a vertex.
    async fn one_hop_parents(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>>;

    /// Every vertex reachable ignoring direction, excluding the vertex itself.
    async fn all_connected(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>>;

    /// Vertices of a supply chain that have no suppliers.
    async fn terminal_vertices(&self, supply_chain_id: &str) -> Result<Vec<MirrorVertex>>;
}
