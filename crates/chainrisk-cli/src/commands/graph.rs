//! Graph mirror commands.
//!
//! With `[graph] enabled = true` these talk to Neo4j. Otherwise the mirror is
//! an in-memory projection rebuilt from the store for the duration of the
//! command, which keeps traversal queries usable without a graph server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info};

use chainrisk_db::DbPool;
use chainrisk_graph::{GraphClient, GraphMirror, GraphSyncer, MemoryMirror, Neo4jMirror, SyncResult};

use super::AppContext;
use crate::output;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Subcommand)]
pub enum GraphCommands {
    /// Retry every connection that failed to sync or was never synced
    Sync {
        #[arg(long)]
        tenant: String,
    },

    /// Drop and re-project every connection of a tenant
    Rebuild {
        #[arg(long)]
        tenant: String,
    },

    /// Mirror totals
    Status,

    /// Direct suppliers of a vertex
    Children {
        vertex_id: String,
        /// Limit the in-memory projection to one tenant
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Direct buyers of a vertex
    Parents {
        vertex_id: String,
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Every vertex connected to a vertex, ignoring direction
    Component {
        vertex_id: String,
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Vertices of a supply chain without suppliers
    Terminals {
        #[arg(long)]
        chain: String,
        #[arg(long)]
        tenant: Option<String>,
    },
}

#[derive(Serialize)]
struct SyncSummary {
    vertices_upserted: usize,
    relationships_upserted: usize,
    relationships_removed: usize,
    failed: usize,
}

impl From<SyncResult> for SyncSummary {
    fn from(r: SyncResult) -> Self {
        Self {
            vertices_upserted: r.vertices_upserted,
            relationships_upserted: r.relationships_upserted,
            relationships_removed: r.relationships_removed,
            failed: r.failed,
        }
    }
}

#[derive(Serialize)]
struct Status {
    backend: &'static str,
    vertices: usize,
    relationships: usize,
}

pub async fn execute(cmd: GraphCommands, ctx: &AppContext) -> Result<()> {
    let pool = ctx.open_db()?;

    match cmd {
        GraphCommands::Sync { tenant } => {
            chainrisk_core::tenant::get_tenant(&pool, &tenant)?;
            let syncer = GraphSyncer::new(pool.clone(), neo4j_mirror(ctx).await?);
            if !ctx.json {
                println!("{}", "Syncing pending connections...".bold());
            }
            let result = syncer.sync_pending(&tenant).await?;
            print_sync(ctx, result)?;
        }

        GraphCommands::Rebuild { tenant } => {
            chainrisk_core::tenant::get_tenant(&pool, &tenant)?;
            let syncer = GraphSyncer::new(pool.clone(), neo4j_mirror(ctx).await?);
            if !ctx.json {
                println!("{}", "Rebuilding graph mirror...".bold());
            }
            let result = syncer.rebuild(&tenant).await?;
            print_sync(ctx, result)?;
        }

        GraphCommands::Status => {
            let mirror = open_mirror(ctx, &pool, None).await?;
            let counts = mirror.counts().await?;
            let status = Status {
                backend: backend_name(ctx),
                vertices: counts.nodes,
                relationships: counts.relationships,
            };
            if ctx.json {
                return output::print_json(&status);
            }
            println!("{}", "Graph mirror".bold());
            println!("  Backend:       {}", status.backend.cyan());
            println!("  Vertices:      {}", status.vertices);
            println!("  Relationships: {}", status.relationships);
            if ctx.config.graph.enabled {
                // Failures recorded per connection are retried by `graph sync`.
                let pending = pending_total(&pool)?;
                if pending > 0 {
                    println!("  Pending sync:  {}", pending.to_string().yellow());
                }
            }
        }

        GraphCommands::Children { vertex_id, tenant } => {
            let mirror = open_mirror(ctx, &pool, tenant.as_deref()).await?;
            let vertices = mirror.one_hop_children(&vertex_id).await?;
            if ctx.json {
                return output::print_json(&vertices);
            }
            output::print_vertices("Suppliers", &vertices);
        }

        GraphCommands::Parents { vertex_id, tenant } => {
            let mirror = open_mirror(ctx, &pool, tenant.as_deref()).await?;
            let vertices = mirror.one_hop_parents(&vertex_id).await?;
            if ctx.json {
                return output::print_json(&vertices);
            }
            output::print_vertices("Buyers", &vertices);
        }

        GraphCommands::Component { vertex_id, tenant } => {
            let mirror = open_mirror(ctx, &pool, tenant.as_deref()).await?;
            let vertices = mirror.all_connected(&vertex_id).await?;
            if ctx.json {
                return output::print_json(&vertices);
            }
            output::print_vertices("Connected component", &vertices);
        }

        GraphCommands::Terminals { chain, tenant } => {
            let mirror = open_mirror(ctx, &pool, tenant.as_deref()).await?;
            let vertices = mirror.terminal_vertices(&chain).await?;
            if ctx.json {
                return output::print_json(&vertices);
            }
            output::print_vertices("Terminal vertices", &vertices);
        }
    }

    Ok(())
}

fn backend_name(ctx: &AppContext) -> &'static str {
    if ctx.config.graph.enabled {
        "neo4j"
    } else {
        "memory"
    }
}

/// Connect to Neo4j, failing fast when it is down, and make sure the schema
/// exists. Sync commands need a persistent mirror.
pub(super) async fn neo4j_mirror(ctx: &AppContext) -> Result<Arc<dyn GraphMirror>> {
    if !ctx.config.graph.enabled {
        anyhow::bail!("The graph mirror is disabled; set [graph] enabled = true in chainrisk.toml");
    }
    let client = tokio::time::timeout(CONNECT_TIMEOUT, GraphClient::connect(&ctx.config.graph))
        .await
        .with_context(|| format!("Timed out connecting to Neo4j at {}", ctx.config.graph.uri))??;
    chainrisk_graph::schema::initialize_schema(&client).await?;
    info!(uri = %ctx.config.graph.uri, "Connected to Neo4j");
    Ok(Arc::new(Neo4jMirror::new(client)))
}

/// Neo4j when enabled, otherwise an in-memory projection of `tenant` (or of
/// every tenant).
async fn open_mirror(ctx: &AppContext, pool: &DbPool, tenant: Option<&str>) -> Result<Arc<dyn GraphMirror>> {
    if ctx.config.graph.enabled {
        return neo4j_mirror(ctx).await;
    }

    let mirror: Arc<dyn GraphMirror> = Arc::new(MemoryMirror::new());
    let syncer = GraphSyncer::detached(pool.clone(), mirror.clone());
    let tenants = match tenant {
        Some(id) => vec![chainrisk_core::tenant::get_tenant(pool, id)?.id],
        None => chainrisk_core::tenant::list_tenants(pool)?
            .into_iter()
            .map(|t| t.id)
            .collect(),
    };
    for tenant_id in &tenants {
        let result = syncer.rebuild(tenant_id).await?;
        debug!(tenant_id = %tenant_id, relationships = result.relationships_upserted, "Projected tenant in memory");
    }
    Ok(mirror)
}

fn pending_total(pool: &DbPool) -> Result<usize> {
    let mut total = 0;
    for tenant in chainrisk_core::tenant::list_tenants(pool)? {
        total += chainrisk_db::queries::sync_state::list_pending(pool, &tenant.id)?.len();
    }
    Ok(total)
}

fn print_sync(ctx: &AppContext, result: SyncResult) -> Result<()> {
    let failed = result.failed;
    if ctx.json {
        return output::print_json(&SyncSummary::from(result));
    }

    println!("\n{}", "Sync complete:".green().bold());
    println!("  Vertices upserted:      {}", result.vertices_upserted);
    println!("  Relationships upserted: {}", result.relationships_upserted);
    println!("  Relationships removed:  {}", result.relationships_removed);
    if failed > 0 {
        println!(
            "  {} {} connection(s) failed; see the log and retry with `chainrisk graph sync`",
            "!".yellow().bold(),
            failed
        );
    }
    Ok(())
}
