//! `chainrisk.toml` loading.
//!
//! Every section is optional. Values missing from the file take their
//! defaults, and a handful of connection settings can be overridden from the
//! environment so deployments do not have to template the file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chainrisk_core::risk::{ScoringConfig, SchedulerConfig};
use chainrisk_graph::GraphConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "chainrisk.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainriskConfig {
    pub database: DatabaseConfig,
    pub graph: GraphConfig,
    pub redis: RedisConfig,
    pub scheduler: SchedulerConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, relative to the working directory unless absolute.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".chainrisk/chainrisk.db"),
        }
    }
}

/// Redis is only used for run leases shared between scheduler processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl ChainriskConfig {
    /// Load from `explicit`, or from `chainrisk.toml` in `dir` when it exists,
    /// then apply environment overrides.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = dir.join(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay `CHAINRISK_DB`, `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD` and
    /// `REDIS_URL`. Setting `REDIS_URL` also enables Redis leases.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = get("CHAINRISK_DB") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(uri) = get("NEO4J_URI") {
            self.graph.uri = uri;
        }
        if let Some(user) = get("NEO4J_USER") {
            self.graph.user = user;
        }
        if let Some(password) = get("NEO4J_PASSWORD") {
            self.graph.password = password;
        }
        if let Some(url) = get("REDIS_URL") {
            self.redis.url = url;
            self.redis.enabled = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate().context("Invalid [scoring] section")?;
        Ok(())
    }

    /// Database path resolved against `dir`.
    pub fn database_path(&self, dir: &Path) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            dir.join(&self.database.path)
        }
    }

    /// Write the default configuration unless the file already exists.
    /// Returns whether a file was written.
    pub fn write_default(dir: &Path) -> Result<bool> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Ok(false);
        }
        let content = toml::to_string_pretty(&Self::default()).context("Failed to serialize default config")?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let mut config = ChainriskConfig::default();
        config.apply_env(|_| None);
        assert_eq!(config, ChainriskConfig::default());
        assert_eq!(
            config.database_path(dir.path()),
            dir.path().join(".chainrisk/chainrisk.db")
        );
        assert_eq!(config.scoring.max_risk_score, 100.0);
        assert!(!config.redis.enabled);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
[database]
path = "/var/lib/chainrisk/store.db"

[scheduler]
interval_secs = 60

[scoring]
high_threshold = 30.0
"#,
        )
        .unwrap();

        let config = ChainriskConfig::from_file(&path).unwrap();
        assert_eq!(config.database_path(dir.path()), PathBuf::from("/var/lib/chainrisk/store.db"));
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.scheduler.lease_secs, SchedulerConfig::default().lease_secs);
        assert_eq!(config.scoring.high_threshold, 30.0);
        assert_eq!(config.scoring.medium_threshold, 60.0);
        assert_eq!(config.graph, GraphConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CHAINRISK_DB", "/tmp/other.db"),
            ("NEO4J_URI", "bolt://graph:7687"),
            ("NEO4J_PASSWORD", "secret"),
            ("REDIS_URL", "redis://cache:6379"),
            ("NEO4J_USER", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = ChainriskConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.graph.uri, "bolt://graph:7687");
        assert_eq!(config.graph.password, "secret");
        assert_eq!(config.graph.user, "neo4j");
        assert!(config.redis.enabled);
        assert_eq!(config.redis.url, "redis://cache:6379");
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = tempdir().unwrap();
        assert!(ChainriskConfig::write_default(dir.path()).unwrap());
        assert!(!ChainriskConfig::write_default(dir.path()).unwrap());

        let loaded = ChainriskConfig::from_file(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(loaded, ChainriskConfig::default());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut config = ChainriskConfig::default();
        config.scoring.high_threshold = 80.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[scheduler\ninterval_secs = ").unwrap();
        assert!(ChainriskConfig::from_file(&path).is_err());
    }
}
