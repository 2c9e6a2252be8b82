//! Risk scoring models.

use chainrisk_db::queries::score_runs::ScoreRunRow;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ChainError, ChainResult};

/// Scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Supply contribution of a producer with no known suppliers, and the
    /// upper bound of a valid baseline.
    pub max_risk_score: f64,
    /// Scores at or below this are HIGH risk.
    pub high_threshold: f64,
    /// Scores at or below this (and above `high_threshold`) are MEDIUM risk.
    pub medium_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_risk_score: 100.0,
            high_threshold: 43.0,
            medium_threshold: 60.0,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> ChainResult<()> {
        if !self.max_risk_score.is_finite() || self.max_risk_score <= 0.0 {
            return Err(ChainError::config("scoring.max_risk_score must be a positive number"));
        }
        if !(self.high_threshold <= self.medium_threshold && self.medium_threshold <= self.max_risk_score) {
            return Err(ChainError::config(
                "scoring thresholds must satisfy high_threshold <= medium_threshold <= max_risk_score",
            ));
        }
        Ok(())
    }

    /// Whether a baseline can be used as a score input.
    pub fn is_valid_baseline(&self, baseline: f64) -> bool {
        baseline.is_finite() && (0.0..=self.max_risk_score).contains(&baseline)
    }
}

/// Risk band of an aggregate score. Lower scores mean higher risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn from_score(score: f64, config: &ScoringConfig) -> Self {
        if score <= config.high_threshold {
            Self::High
        } else if score <= config.medium_threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// The stored score of one actor in one supply chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VertexScore {
    pub vertex_id: String,
    pub actor_id: String,
    pub supply_chain_id: String,
    pub aggregate_score: f64,
    /// `None` until the first run scores the vertex.
    pub last_scored_at: Option<String>,
    pub severity: Severity,
}

/// A vertex that could not be scored in a run. It keeps its previous score.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("Vertex {vertex_id} (actor {actor_id}) not scored: {reason}")]
pub struct ScoringFailure {
    pub vertex_id: String,
    pub actor_id: String,
    pub supply_chain_id: String,
    pub reason: String,
}

/// A persisted run, as listed in the run history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRun {
    pub id: String,
    pub tenant_id: String,
    pub started_at: String,
    /// `None` while the run is in progress, or if it died.
    pub finished_at: Option<String>,
    pub scored: usize,
    pub failed: usize,
    pub cyclic_components: usize,
    pub cancelled: bool,
}

impl ScoreRun {
    pub fn from_row(row: ScoreRunRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            started_at: row.started_at,
            finished_at: row.finished_at,
            scored: row.scored.max(0) as usize,
            failed: row.failed.max(0) as usize,
            cyclic_components: row.cyclic_components.max(0) as usize,
            cancelled: row.cancelled,
        }
    }
}

/// Outcome of one tenant run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub tenant_id: String,
    pub scored: usize,
    pub failed: Vec<ScoringFailure>,
    /// Strongly connected supplier components with more than one vertex.
    pub cyclic_components: usize,
    pub cancelled: bool,
    pub started_at: String,
    pub finished_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bands() {
        let config = ScoringConfig::default();
        assert_eq!(Severity::from_score(43.0, &config), Severity::High);
        assert_eq!(Severity::from_score(43.5, &config), Severity::Medium);
        assert_eq!(Severity::from_score(60.0, &config), Severity::Medium);
        assert_eq!(Severity::from_score(60.1, &config), Severity::Low);
    }

    #[test]
    fn test_config_validation() {
        assert!(ScoringConfig::default().validate().is_ok());
        let bad = ScoringConfig {
            high_threshold: 70.0,
            ..ScoringConfig::default()
        };
        assert!(matches!(bad.validate(), Err(ChainError::Config(_))));
    }

    #[test]
    fn test_baseline_validity() {
        let config = ScoringConfig::default();
        assert!(config.is_valid_baseline(0.0));
        assert!(config.is_valid_baseline(100.0));
        assert!(!config.is_valid_baseline(-1.0));
        assert!(!config.is_valid_baseline(100.5));
        assert!(!config.is_valid_baseline(f64::NAN));
        assert!(!config.is_valid_baseline(f64::INFINITY));
    }
}
