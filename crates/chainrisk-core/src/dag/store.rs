//! Edge storage behind [`super::Dag`].

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use chainrisk_db::queries::lineage;
use chainrisk_db::DbPool;

use super::DagResult;

/// Parent/child adjacency storage.
///
/// Neighbour lists are returned sorted so traversals are deterministic.
pub trait DagStore {
    fn parents(&self, node: &str) -> DagResult<Vec<String>>;
    fn children(&self, node: &str) -> DagResult<Vec<String>>;
    /// Insert an edge without checking for cycles. Inserting an existing edge
    /// is a no-op.
    fn insert_edge(&mut self, parent: &str, child: &str) -> DagResult<()>;
    /// Remove an edge. Returns whether it existed.
    fn remove_edge(&mut self, parent: &str, child: &str) -> DagResult<bool>;

    /// Insert an edge unless `parent` is `child` or one of its descendants.
    /// Returns false, writing nothing, when the edge would close a cycle.
    ///
    /// Stores shared between writers must override this so the check and the
    /// insert are atomic.
    fn insert_checked(&mut self, parent: &str, child: &str) -> DagResult<bool> {
        let mut seen = HashSet::from([child.to_string()]);
        let mut queue = VecDeque::from([child.to_string()]);
        while let Some(current) = queue.pop_front() {
            if current == parent {
                return Ok(false);
            }
            for next in self.children(&current)? {
                if seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
        self.insert_edge(parent, child)?;
        Ok(true)
    }
}

/// Adjacency held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDag {
    parents: BTreeMap<String, BTreeSet<String>>,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl MemoryDag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge_count(&self) -> usize {
        self.children.values().map(BTreeSet::len).sum()
    }
}

impl DagStore for MemoryDag {
    fn parents(&self, node: &str) -> DagResult<Vec<String>> {
        Ok(self
            .parents
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn children(&self, node: &str) -> DagResult<Vec<String>> {
        Ok(self
            .children
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_edge(&mut self, parent: &str, child: &str) -> DagResult<()> {
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        self.parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
        Ok(())
    }

    fn remove_edge(&mut self, parent: &str, child: &str) -> DagResult<bool> {
        let removed = self
            .children
            .get_mut(parent)
            .map(|set| set.remove(child))
            .unwrap_or(false);
        if let Some(set) = self.parents.get_mut(child) {
            set.remove(parent);
        }
        Ok(removed)
    }
}

/// Adjacency persisted in the `lineage_edges` table, one named graph per
/// instance.
#[derive(Clone)]
pub struct LineageDag {
    pool: DbPool,
    graph: String,
}

impl LineageDag {
    pub fn new(pool: DbPool, graph: impl Into<String>) -> Self {
        Self {
            pool,
            graph: graph.into(),
        }
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }
}

impl DagStore for LineageDag {
    fn parents(&self, node: &str) -> DagResult<Vec<String>> {
        Ok(lineage::parents_of(&self.pool, &self.graph, node)?)
    }

    fn children(&self, node: &str) -> DagResult<Vec<String>> {
        Ok(lineage::children_of(&self.pool, &self.graph, node)?)
    }

    fn insert_edge(&mut self, parent: &str, child: &str) -> DagResult<()> {
        Ok(lineage::insert_edge(&self.pool, &self.graph, parent, child)?)
    }

    fn insert_checked(&mut self, parent: &str, child: &str) -> DagResult<bool> {
        Ok(lineage::insert_edge_acyclic(&self.pool, &self.graph, parent, child)?)
    }

    fn remove_edge(&mut self, parent: &str, child: &str) -> DagResult<bool> {
        Ok(lineage::remove_edge(&self.pool, &self.graph, parent, child)?)
    }
}
