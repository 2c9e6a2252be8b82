//! # chainrisk graph
//!
//! Traversal-optimized mirror of the actor connection graph.
//!
//! The relational store stays authoritative. This crate projects its
//! connections into a graph backend (Neo4j in production, in-memory for tests)
//! one connection at a time, and answers neighbor and component queries that
//! would need recursive joins in SQL.

pub mod client;
pub mod mirror;
pub mod queries;
pub mod schema;
pub mod sync;

pub use client::{GraphClient, GraphConfig, GraphCounts};
pub use mirror::{EdgeKind, GraphMirror, MemoryMirror, MirrorEdge, MirrorVertex, Neo4jMirror};
pub use sync::{GraphSyncer, SyncFailure, SyncResult};
