//! Vertex traversal queries.
//!
//! Suppliers of a vertex are reached over an outgoing `BUYS_FROM` or an
//! incoming `SUPPLIES_TO`; buyers over the opposite pair.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;

use anyhow::Result;
use neo4rs::{Query, Row};

use crate::mirror::MirrorVertex;
use crate::GraphClient;

const VERTEX_COLUMNS: &str = "n.id as id, n.actor_id as actor_id, \
     n.supply_chain_id as supply_chain_id, n.tenant_id as tenant_id, n.kind as kind";

/// Direct suppliers of a vertex, sorted by ID.
pub async fn one_hop_children(client: &GraphClient, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
    let query = Query::new(format!(
        "MATCH (:Vertex {{id: $id}})-[:BUYS_FROM]->(n:Vertex) RETURN {cols}
         UNION
         MATCH (:Vertex {{id: $id}})<-[:SUPPLIES_TO]-(n:Vertex) RETURN {cols}",
        cols = VERTEX_COLUMNS
    ))
    .param("id", vertex_id);

    let rows = client.query(query).await?;
    Ok(sorted_unique(parse_vertex_rows(rows)))
}

/// Direct buyers of a vertex, sorted by ID.
pub async fn one_hop_parents(client: &GraphClient, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
    let query = Query::new(format!(
        "MATCH (:Vertex {{id: $id}})-[:SUPPLIES_TO]->(n:Vertex) RETURN {cols}
         UNION
         MATCH (:Vertex {{id: $id}})<-[:BUYS_FROM]-(n:Vertex) RETURN {cols}",
        cols = VERTEX_COLUMNS
    ))
    .param("id", vertex_id);

    let rows = client.query(query).await?;
    Ok(sorted_unique(parse_vertex_rows(rows)))
}

/// Every vertex connected to `vertex_id`, ignoring direction.
///
/// Expands one frontier per round instead of a variable-length pattern so the
/// query cost stays bounded on large components.
pub async fn all_connected(client: &GraphClient, vertex_id: &str) -> Result<Vec<MirrorVertex>> {
    expand_component(vertex_id, |frontier| async move {
        let query = Query::new(format!(
            "MATCH (v:Vertex)-[:BUYS_FROM|SUPPLIES_TO]-(n:Vertex)
             WHERE v.id IN $ids
             RETURN DISTINCT {cols}",
            cols = VERTEX_COLUMNS
        ))
        .param("ids", frontier);
        Ok(parse_vertex_rows(client.query(query).await?))
    })
    .await
}

/// Breadth-first expansion from `start`, one `neighbours` call per frontier.
/// Every round adds at least one unseen vertex, so it ends after at most one
/// round per vertex of the component.
async fn expand_component<F, Fut>(start: &str, mut neighbours: F) -> Result<Vec<MirrorVertex>>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<MirrorVertex>>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(start.to_string());

    let mut found: Vec<MirrorVertex> = Vec::new();
    let mut frontier = vec![start.to_string()];

    while !frontier.is_empty() {
        let next = neighbours(std::mem::take(&mut frontier)).await?;
        for vertex in next {
            if seen.insert(vertex.id.clone()) {
                frontier.push(vertex.id.clone());
                found.push(vertex);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Vertices of a supply chain with no supplier in either representation.
pub async fn terminal_vertices(client: &GraphClient, supply_chain_id: &str) -> Result<Vec<MirrorVertex>> {
    let query = Query::new(format!(
        "MATCH (n:Vertex {{supply_chain_id: $sc}})
         WHERE NOT (n)-[:BUYS_FROM]->(:Vertex) AND NOT (n)<-[:SUPPLIES_TO]-(:Vertex)
         RETURN {cols}
         ORDER BY n.id",
        cols = VERTEX_COLUMNS
    ))
    .param("sc", supply_chain_id);

    let rows = client.query(query).await?;
    Ok(parse_vertex_rows(rows))
}

/// Parse rows produced with the shared vertex column list.
pub(crate) fn parse_vertex_rows(rows: Vec<Row>) -> Vec<MirrorVertex> {
    rows.into_iter()
        .map(|row| MirrorVertex {
            id: row.get("id").unwrap_or_default(),
            actor_id: row.get("actor_id").unwrap_or_default(),
            supply_chain_id: row.get("supply_chain_id").unwrap_or_default(),
            tenant_id: row.get("tenant_id").unwrap_or_default(),
            kind: row.get("kind").unwrap_or_default(),
        })
        .filter(|v| !v.id.is_empty())
        .collect()
}

fn sorted_unique(vertices: Vec<MirrorVertex>) -> Vec<MirrorVertex> {
    let by_id: BTreeMap<String, MirrorVertex> =
        vertices.into_iter().map(|v| (v.id.clone(), v)).collect();
    by_id.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(id: &str) -> MirrorVertex {
        MirrorVertex {
            id: id.to_string(),
            actor_id: format!("actor-{}", id),
            supply_chain_id: "sc".to_string(),
            tenant_id: "t".to_string(),
            kind: "COMPANY".to_string(),
        }
    }

    /// Undirected path n0 - n1 - ... - n{len}.
    async fn path_neighbours(frontier: Vec<String>, len: usize) -> Result<Vec<MirrorVertex>> {
        let mut out = Vec::new();
        for id in frontier {
            let i: usize = id.trim_start_matches('n').parse()?;
            if i > 0 {
                out.push(vertex(&format!("n{}", i - 1)));
            }
            if i < len {
                out.push(vertex(&format!("n{}", i + 1)));
            }
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_expand_component_follows_long_paths() {
        let len = 12_000;
        let found = expand_component("n0", |frontier| path_neighbours(frontier, len))
            .await
            .unwrap();
        assert_eq!(found.len(), len);
        assert!(found.iter().any(|v| v.id == format!("n{}", len)));
        assert!(found.iter().all(|v| v.id != "n0"));
    }

    #[tokio::test]
    async fn test_expand_component_propagates_errors() {
        let result = expand_component("n0", |_| async { Err(anyhow::anyhow!("mirror down")) }).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_sorted_unique_dedupes_by_id() {
        let out = sorted_unique(vec![vertex("b"), vertex("a"), vertex("b")]);
        let ids: Vec<&str> = out.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
