//! Neo4j schema initialization (constraints and indexes).

use anyhow::Result;
use neo4rs::Query;
use tracing::info;

use crate::GraphClient;

/// Cypher statements for schema initialization.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT vertex_id IF NOT EXISTS FOR (v:Vertex) REQUIRE v.id IS UNIQUE",
    "CREATE INDEX vertex_actor IF NOT EXISTS FOR (v:Vertex) ON (v.actor_id)",
    "CREATE INDEX vertex_supply_chain IF NOT EXISTS FOR (v:Vertex) ON (v.supply_chain_id)",
    "CREATE INDEX vertex_tenant IF NOT EXISTS FOR (v:Vertex) ON (v.tenant_id)",
];

/// Initialize Neo4j schema with constraints and indexes.
///
/// Safe to run multiple times - uses IF NOT EXISTS clauses.
pub async fn initialize_schema(client: &GraphClient) -> Result<()> {
    info!("Initializing Neo4j schema...");

    for statement in SCHEMA_STATEMENTS {
        client.execute(Query::new(statement.to_string())).await?;
    }

    info!("Neo4j schema initialized ({} statements)", SCHEMA_STATEMENTS.len());
    Ok(())
}
