//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chainrisk_core::risk::{RedisRunLock, RiskEngine, RunLock, SqliteRunLock};
use chainrisk_db::DbPool;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::config::ChainriskConfig;

pub mod actor;
pub mod chain;
pub mod connection;
pub mod dag;
pub mod graph;
pub mod init;
pub mod risk;
pub mod tenant;

/// Supply-chain risk propagation engine
#[derive(Parser)]
#[command(name = "chainrisk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Working directory (defaults to the current directory)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Config file (defaults to ./chainrisk.toml when present)
    #[arg(short, long, global = true, env = "CHAINRISK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and a default chainrisk.toml
    Init(init::InitArgs),

    /// Apply pending database migrations
    Migrate,

    /// Tenant management
    #[command(subcommand)]
    Tenant(tenant::TenantCommands),

    /// Supply chain management
    #[command(subcommand)]
    Chain(chain::ChainCommands),

    /// Actor management and baseline scores
    #[command(subcommand)]
    Actor(actor::ActorCommands),

    /// Connection workflow
    #[command(subcommand)]
    Connection(connection::ConnectionCommands),

    /// Acyclic lineage graphs
    #[command(subcommand)]
    Dag(dag::DagCommands),

    /// Risk scoring runs and scores
    #[command(subcommand)]
    Risk(risk::RiskCommands),

    /// Graph mirror sync and traversal
    #[command(subcommand)]
    Graph(graph::GraphCommands),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let dir = match self.dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to resolve current directory")?,
        };
        let config = ChainriskConfig::load(self.config.as_deref(), &dir)?;
        let ctx = AppContext {
            dir,
            config,
            json: self.json,
        };

        match self.command {
            Commands::Init(args) => init::execute(args, &ctx),
            Commands::Migrate => init::migrate(&ctx),
            Commands::Tenant(cmd) => tenant::execute(cmd, &ctx),
            Commands::Chain(cmd) => chain::execute(cmd, &ctx),
            Commands::Actor(cmd) => actor::execute(cmd, &ctx),
            Commands::Connection(cmd) => connection::execute(cmd, &ctx),
            Commands::Dag(cmd) => dag::execute(cmd, &ctx),
            Commands::Risk(cmd) => risk::execute(cmd, &ctx).await,
            Commands::Graph(cmd) => graph::execute(cmd, &ctx).await,
        }
    }
}

/// Resolved settings shared by every command.
pub struct AppContext {
    pub dir: PathBuf,
    pub config: ChainriskConfig,
    pub json: bool,
}

impl AppContext {
    pub fn db_path(&self) -> PathBuf {
        self.config.database_path(&self.dir)
    }

    /// Open the store, creating its directory and applying migrations.
    pub fn open_db(&self) -> Result<DbPool> {
        let path = self.db_path();
        ensure_parent(&path)?;
        debug!(path = %path.display(), "Opening database");
        chainrisk_db::init_pool(&path).with_context(|| format!("Failed to open database {}", path.display()))
    }

    pub fn engine(&self, pool: &DbPool) -> Arc<RiskEngine> {
        Arc::new(RiskEngine::new(pool.clone(), self.config.scoring.clone()))
    }

    /// Redis lease when Redis is enabled, otherwise a lease row in the store.
    pub async fn run_lock(&self, pool: &DbPool) -> Result<Arc<dyn RunLock>> {
        let lease: Duration = self.config.scheduler.lease();
        if self.config.redis.enabled {
            let redis = chainrisk_redis::init_pool(&self.config.redis.url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", self.config.redis.url))?;
            info!(url = %self.config.redis.url, "Using Redis run leases");
            Ok(Arc::new(RedisRunLock::new(redis, lease)))
        } else {
            Ok(Arc::new(SqliteRunLock::new(pool.clone(), lease)))
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}
