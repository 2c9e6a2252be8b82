//! chainrisk core library.
//!
//! Domain models and business logic: tenants, actors and supply chains, the
//! connection workflow, acyclic lineage graphs, and the risk propagation
//! engine that scores every actor/supply-chain vertex.

pub mod actor;
pub mod connection;
pub mod dag;
pub mod error;
pub mod risk;
pub mod supply_chain;
pub mod tenant;

pub use error::{ChainError, ChainResult};
