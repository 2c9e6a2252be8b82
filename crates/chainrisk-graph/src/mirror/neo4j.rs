//! Neo4j-backed mirror.

use anyhow::Result;
use async_trait::async_trait;
use neo4rs::Query;
use tracing::debug;

use super::{EdgeKind, GraphMirror, MirrorEdge, MirrorVertex};
use crate::client::GraphCounts;
use crate::queries::traversal;
use crate::GraphClient;

/// Mirror stored in Neo4j.
#[derive(Clone)]
pub struct Neo4jMirror {
    client: GraphClient,
}

impl Neo4jMirror {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    async fn count_query(&self, query: Query) -> Result<usize> {
        let count: i64 = self.client.query_scalar(query, "removed").await?.unwrap_or(0);
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl GraphMirror for Neo4jMirror {
    async fn upsert_vertex(&self, vertex: &MirrorVertex) -> Result<()> {
        let query = Query::new(
            "MERGE (v:Vertex {id: $id})
             SET v.actor_id = $actor_id,
                 v.supply_chain_id = $supply_chain_id,
                 v.tenant_id = $tenant_id,
                 v.kind = $kind"
                .to_string(),
        )
        .param("id", vertex.id.as_str())
        .param("actor_id", vertex.actor_id.as_str())
        .param("supply_chain_id", vertex.supply_chain_id.as_str())
        .param("tenant_id", vertex.tenant_id.as_str())
        .param("kind", vertex.kind.as_str());

        self.client.execute(query).await
    }

    async fn upsert_edge(&self, edge: &MirrorEdge) -> Result<()> {
        // Relationship types cannot be parameterized; `rel_type` is a closed set.
        let query = Query::new(format!(
            "MATCH (a:Vertex {{id: $from_id}}), (b:Vertex {{id: $to_id}})
             MERGE (a)-[r:{} {{supply_chain_id: $supply_chain_id}}]->(b)
             SET r.connection_id = $connection_id",
            edge.kind.rel_type()
        ))
        .param("from_id", edge.from_id.as_str())
        .param("to_id", edge.to_id.as_str())
        .param("supply_chain_id", edge.supply_chain_id.as_str())
        .param("connection_id", edge.connection_id.as_str());

        self.client.execute(query).await?;
        debug!(from = %edge.from_id, to = %edge.to_id, rel = edge.kind.rel_type(), "Edge merged");
        Ok(())
    }

    async fn remove_edge(
        &self,
        from_id: &str,
        to_id: &str,
        kind: EdgeKind,
        supply_chain_id: &str,
    ) -> Result<bool> {
        let query = Query::new(format!(
            "MATCH (:Vertex {{id: $from_id}})-[r:{} {{supply_chain_id: $supply_chain_id}}]->(:Vertex {{id: $to_id}})
             DELETE r
             RETURN count(*) as removed",
            kind.rel_type()
        ))
        .param("from_id", from_id)
        .param("to_id", to_id)
        .param("supply_chain_id", supply_chain_id);

        Ok(self.count_query(query).await? > 0)
    }

    async fn disconnect_all(&self, vertex_id: &str) -> Result<usize> {
        let query = Query::new(
            "MATCH (:Vertex {id: $id})-[r:BUYS_FROM|SUPPLIES_TO]-(:Vertex)
             DELETE r
             RETURN count(*) as removed"
                .to_string(),
        )
        .param("id", vertex_id);

        self.count_query(query).await
    }

    async fn delete_vertex(&self, vertex_id: &str) -> Result<bool> {
        let query = Query::new(
            "MATCH (v:Vertex {id: $id})
             DETACH DELETE v
             RETURN count(*) as removed"
                .to_string(),
        )
        .param("id", vertex_id);

        Ok(self.count_query(query).await? > 0)
    }

    async fn clear_tenant(&self, tenant_id: &str) -> Result<()> {
        let query = Query::new("MATCH (v:Vertex {tenant_id: $tenant_id}) DETACH DELETE v".to_string())
            .param("tenant_id", tenant_id);
        self.client.execute(query).await
    }

    async fn counts(&self) -> Result<GraphCounts> {
        self.client.get_counts().await
    }

    async fn one_hop_children(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
        traversal::one_hop_children(&self.client, vertex_id).await
    }

    async fn one_hop_parents(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
        traversal::one_hop_parents(&self.client, vertex_id).await
    }

    async fn all_connected(&self, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
        traversal::all_connected(&self.client, vertex_id).await
    }

    async fn terminal_vertices(&self, supply_chain_id: &str) -> Result<Vec<MirrorVertex>> {
        traversal::terminal_vertices(&self.client, supply_chain_id).await
    }
}
