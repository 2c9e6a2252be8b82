//! Neo4j connection client.

use anyhow::{Context, Result};
use neo4rs::{ConfigBuilder, Graph, Query};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    /// Disable to run without a mirror; traversal commands then use the
    /// in-memory backend rebuilt from the store.
    pub enabled: bool,
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "chainrisk_dev".to_string(),
            database: "neo4j".to_string(),
            max_connections: 4,
        }
    }
}

/// Client for Neo4j graph operations.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Create a new GraphClient from config.
    ///
    /// neo4rs builds its pool lazily, so `Graph::connect` alone does not open a
    /// bolt session. A `RETURN 1` ping forces the handshake and lets callers
    /// wrap this in a timeout that fails fast when Neo4j is down.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(200)
            .build()
            .context("Failed to build Neo4j config")?;

        let graph = Graph::connect(neo4j_config)
            .await
            .context("Failed to create Neo4j connection pool")?;

        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .context("Neo4j is not responding to queries")?;

        Ok(Self { graph })
    }

    /// Execute a Cypher query that returns no results.
    pub async fn execute(&self, query: Query) -> Result<()> {
        self.graph.run(query).await.context("Neo4j query execution failed")?;
        Ok(())
    }

    /// Execute a Cypher query and return results as rows.
    pub async fn query(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self.graph.execute(query).await.context("Neo4j query failed")?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.context("Failed to read Neo4j row")? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a Cypher query and return a single scalar value.
    pub async fn query_scalar<T: DeserializeOwned>(&self, query: Query, field: &str) -> Result<Option<T>> {
        let rows = self.query(query).await?;
        if let Some(row) = rows.into_iter().next() {
            let val: T = row
                .get(field)
                .map_err(|e| anyhow::anyhow!("Failed to get field '{}': {:?}", field, e))?;
            Ok(Some(val))
        } else {
            Ok(None)
        }
    }

    /// Get vertex and relationship counts of the mirror.
    pub async fn get_counts(&self) -> Result<GraphCounts> {
        let node_query = Query::new("MATCH (v:Vertex) RETURN count(v) as count".to_string());
        let rel_query =
            Query::new("MATCH (:Vertex)-[r]->(:Vertex) RETURN count(r) as count".to_string());

        let node_count: i64 = self.query_scalar(node_query, "count").await?.unwrap_or(0);
        let rel_count: i64 = self.query_scalar(rel_query, "count").await?.unwrap_or(0);

        Ok(GraphCounts {
            nodes: node_count.max(0) as usize,
            relationships: rel_count.max(0) as usize,
        })
    }
}

/// Node and relationship counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphCounts {
    pub nodes: usize,
    pub relationships: usize,
}
