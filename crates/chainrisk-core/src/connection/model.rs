//! Connection domain models.

use chainrisk_db::queries::connections::ConnectionRow;
use serde::{Deserialize, Serialize};

/// A directed relationship Source -> Target inside one supply chain.
///
/// `is_supplier` means the target supplies the source; `is_buyer` means the
/// target buys from the source. Both may be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub supply_chain_id: String,
    pub is_buyer: bool,
    pub is_supplier: bool,
    pub status: ConnectionStatus,
    pub initiation: Initiation,
    /// The automatically created reverse connection, if any.
    pub paired_with: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Connection {
    pub fn from_row(row: ConnectionRow) -> Self {
        Self {
            id: row.id,
            source_id: row.source_id,
            target_id: row.target_id,
            supply_chain_id: row.supply_chain_id,
            is_buyer: row.is_buyer,
            is_supplier: row.is_supplier,
            status: ConnectionStatus::from_str(&row.status),
            initiation: Initiation::from_str(&row.initiation),
            paired_with: row.paired_with,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Pending,
    Approved,
    Revoked,
}

impl ConnectionStatus {
    /// Parse from string.
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "APPROVED" => Self::Approved,
            "REVOKED" => Self::Revoked,
            _ => Self::Pending,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Revoked => "REVOKED",
        }
    }

    /// Check if transition to another status is valid.
    pub fn can_transition_to(&self, to: &Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::Approved) => true,
            (Self::Pending, Self::Revoked) => true,
            (Self::Approved, Self::Revoked) => true,
            // Re-activation
            (Self::Revoked, Self::Approved) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }

    /// Rank used to pick the representative when several connections link
    /// the same pair of actors.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Approved => 2,
            Self::Pending => 1,
            Self::Revoked => 0,
        }
    }
}

/// Who created a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Initiation {
    Manual,
    /// Created by the store, e.g. the reverse half of a symmetric pair.
    System,
}

impl Initiation {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SYSTEM" => Self::System,
            _ => Self::Manual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::System => "SYSTEM",
        }
    }
}

/// Input for creating a connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewConnection {
    pub source_id: String,
    pub target_id: String,
    pub supply_chain_id: String,
    pub is_buyer: bool,
    pub is_supplier: bool,
    pub status: ConnectionStatus,
    pub initiation: Initiation,
}

impl NewConnection {
    /// A manual, pending connection in which `target` supplies `source`.
    pub fn supplier(source_id: &str, target_id: &str, supply_chain_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            supply_chain_id: supply_chain_id.to_string(),
            is_buyer: false,
            is_supplier: true,
            status: ConnectionStatus::Pending,
            initiation: Initiation::Manual,
        }
    }

    /// A manual, pending connection in which `target` buys from `source`.
    pub fn buyer(source_id: &str, target_id: &str, supply_chain_id: &str) -> Self {
        Self {
            is_buyer: true,
            is_supplier: false,
            ..Self::supplier(source_id, target_id, supply_chain_id)
        }
    }

    pub fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.status = status;
        self
    }
}

/// A counterpart of an actor, seen from that actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectedActor {
    pub actor_id: String,
    pub connection_id: String,
    /// The counterpart buys from the queried actor.
    pub is_buyer: bool,
    /// The counterpart supplies the queried actor.
    pub is_supplier: bool,
    pub status: ConnectionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use ConnectionStatus::*;
        assert!(Pending.can_transition_to(&Approved));
        assert!(Pending.can_transition_to(&Revoked));
        assert!(Approved.can_transition_to(&Revoked));
        assert!(Revoked.can_transition_to(&Approved));
        assert!(Approved.can_transition_to(&Approved));
        assert!(!Approved.can_transition_to(&Pending));
        assert!(!Revoked.can_transition_to(&Pending));
    }
}
