//! Read-only Cypher queries over the mirror.

pub mod traversal;
