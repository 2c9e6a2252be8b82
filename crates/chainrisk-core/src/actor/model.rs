//! Actor domain models.

use chainrisk_db::queries::actors::ActorRow;
use serde::{Deserialize, Serialize};

/// A participant in a supply chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub role: ActorRole,
    /// Externally supplied risk input. Absent means 0.
    pub baseline_risk_score: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Actor {
    pub fn from_row(row: ActorRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            role: ActorRole::from_str(&row.role),
            baseline_risk_score: row.baseline_risk_score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    /// Baseline used for scoring.
    pub fn baseline(&self) -> f64 {
        self.baseline_risk_score.unwrap_or(0.0)
    }
}

/// What an actor is at the origin of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    /// Primary producer (farm, mine). Unknown upstream, so it carries full
    /// supply risk when it has no suppliers.
    Producer,
    Company,
}

impl ActorRole {
    /// Parse from the stored form. Anything unrecognized is a company.
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PRODUCER" => Self::Producer,
            _ => Self::Company,
        }
    }

    /// Strict parse for user input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PRODUCER" => Some(Self::Producer),
            "COMPANY" => Some(Self::Company),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "PRODUCER",
            Self::Company => "COMPANY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(ActorRole::parse("producer"), Some(ActorRole::Producer));
        assert_eq!(ActorRole::parse("Company"), Some(ActorRole::Company));
        assert_eq!(ActorRole::parse("broker"), None);
        assert_eq!(ActorRole::from_str("broker"), ActorRole::Company);
    }
}
