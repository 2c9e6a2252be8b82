//! Centralized error types for chainrisk.

use thiserror::Error;

/// Main error type for chainrisk operations.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Supply chain not found: {0}")]
    SupplyChainNotFound(String),

    #[error("Actor not found: {0}")]
    ActorNotFound(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Vertex not found: actor {actor_id} in supply chain {supply_chain_id}")]
    VertexNotFound {
        actor_id: String,
        supply_chain_id: String,
    },

    #[error("Connection already exists: {0}")]
    ConnectionExists(String),

    #[error("Invalid state transition: cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Scoring run already in progress for tenant {0}")]
    RunConflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    Database(#[from] chainrisk_db::DbError),

    #[error("Redis error: {0}")]
    Redis(#[from] chainrisk_redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

/// Result type for chainrisk operations.
pub type ChainResult<T> = Result<T, ChainError>;

impl ChainError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
