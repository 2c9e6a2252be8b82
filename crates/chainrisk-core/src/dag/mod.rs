//! Strictly acyclic parent/child graphs (batch lineage and similar).
//!
//! Unlike the actor connection graph, which may contain cycles, a [`Dag`]
//! rejects any edge that would close one. The store checks and writes in one
//! step, so a rejected mutation leaves the graph untouched and two writers
//! cannot close a cycle between them.

mod store;

pub use store::{DagStore, LineageDag, MemoryDag};

use std::collections::{HashSet, VecDeque};

use thiserror::Error;
use tracing::debug;

/// Errors from DAG operations.
#[derive(Error, Debug)]
pub enum DagError {
    #[error("Edge {parent} -> {child} would create a cycle")]
    Cycle { parent: String, child: String },

    #[error("Database error: {0}")]
    Database(#[from] chainrisk_db::DbError),
}

pub type DagResult<T> = Result<T, DagError>;

#[derive(Clone, Copy)]
enum Walk {
    Up,
    Down,
}

/// Cycle-checked operations over a [`DagStore`].
pub struct Dag<S: DagStore> {
    store: S,
}

impl<S: DagStore> Dag<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Make `candidate_parent` a parent of `child`.
    pub fn add_parent(&mut self, child: &str, candidate_parent: &str) -> DagResult<()> {
        if !self.store.insert_checked(candidate_parent, child)? {
            return Err(DagError::Cycle {
                parent: candidate_parent.to_string(),
                child: child.to_string(),
            });
        }
        debug!(parent = candidate_parent, child, "DAG edge added");
        Ok(())
    }

    /// Make `child` a child of `parent`.
    pub fn add_child(&mut self, parent: &str, child: &str) -> DagResult<()> {
        self.add_parent(child, parent)
    }

    pub fn remove_parent(&mut self, child: &str, parent: &str) -> DagResult<bool> {
        self.store.remove_edge(parent, child)
    }

    pub fn remove_child(&mut self, parent: &str, child: &str) -> DagResult<bool> {
        self.store.remove_edge(parent, child)
    }

    /// Every node reachable along child edges, in breadth-first order.
    pub fn descendants(&self, node: &str, include_self: bool) -> DagResult<Vec<String>> {
        self.walk(node, include_self, Walk::Down)
    }

    /// Every node reachable along parent edges, in breadth-first order.
    pub fn ancestors(&self, node: &str, include_self: bool) -> DagResult<Vec<String>> {
        self.walk(node, include_self, Walk::Up)
    }

    /// Descendants without children. A childless node is its own only leaf.
    pub fn leaf_nodes(&self, node: &str) -> DagResult<Vec<String>> {
        let mut leaves = Vec::new();
        for id in self.descendants(node, true)? {
            if self.store.children(&id)?.is_empty() {
                leaves.push(id);
            }
        }
        Ok(leaves)
    }

    /// Ancestors without parents. A parentless node is its own only root.
    pub fn root_nodes(&self, node: &str) -> DagResult<Vec<String>> {
        let mut roots = Vec::new();
        for id in self.ancestors(node, true)? {
            if self.store.parents(&id)?.is_empty() {
                roots.push(id);
            }
        }
        Ok(roots)
    }

    /// No parents and no children.
    pub fn is_island(&self, node: &str) -> DagResult<bool> {
        Ok(self.store.parents(node)?.is_empty() && self.store.children(node)?.is_empty())
    }

    fn walk(&self, node: &str, include_self: bool, direction: Walk) -> DagResult<Vec<String>> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(node.to_string());
        let mut out = Vec::new();
        if include_self {
            out.push(node.to_string());
        }

        let mut queue = VecDeque::from([node.to_string()]);
        while let Some(current) = queue.pop_front() {
            let next = match direction {
                Walk::Down => self.store.children(&current)?,
                Walk::Up => self.store.parents(&current)?,
            };
            for id in next {
                if seen.insert(id.clone()) {
                    out.push(id.clone());
                    queue.push_back(id);
                }
            }
        }
        Ok(out)
    }
}
