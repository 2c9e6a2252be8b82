//! Scoring runs, score queries and the scheduler daemon.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use chainrisk_core::risk::{spawn_event_bridge, Scheduler};
use chainrisk_core::ChainError;
use chainrisk_db::EventRelay;
use chainrisk_graph::GraphSyncer;

use super::AppContext;
use crate::output;

#[derive(Subcommand)]
pub enum RiskCommands {
    /// Score one tenant, or every tenant with --all
    Run {
        #[arg(long, required_unless_present = "all")]
        tenant: Option<String>,

        #[arg(long, conflicts_with = "tenant")]
        all: bool,
    },

    /// Stored score of one actor in a supply chain
    Score {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        chain: String,
        actor_id: String,
    },

    /// Stored scores of every actor in a supply chain
    Scores {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        chain: String,
    },

    /// Recent scoring runs of a tenant
    Runs {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Run the periodic scheduler until Ctrl+C
    Schedule(ScheduleArgs),
}

#[derive(Args)]
pub struct ScheduleArgs {
    /// Also write logs to a daily-rotated file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Override scheduler.interval_secs
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

pub async fn execute(cmd: RiskCommands, ctx: &AppContext) -> Result<()> {
    let pool = ctx.open_db()?;

    match cmd {
        RiskCommands::Run { tenant, all } => {
            let engine = ctx.engine(&pool);
            let lock = ctx.run_lock(&pool).await?;
            let scheduler = Scheduler::new(engine, lock, ctx.config.scheduler.clone());

            let results = match (tenant, all) {
                (Some(tenant_id), _) => vec![scheduler.run_tenant(&tenant_id).await],
                (None, true) => scheduler.run_all().await,
                (None, false) => bail!("Pass --tenant <id> or --all"),
            };

            let mut reports = Vec::new();
            let mut errors = Vec::new();
            for result in results {
                match result {
                    Ok(report) => reports.push(report),
                    Err(e) => errors.push(e),
                }
            }

            if ctx.json {
                output::print_json(&reports)?;
            } else {
                for report in &reports {
                    output::print_run_report(report);
                }
            }
            for e in &errors {
                match e {
                    ChainError::RunConflict(tenant_id) => eprintln!(
                        "{} Tenant {} is already being scored, skipped",
                        "!".yellow().bold(),
                        tenant_id
                    ),
                    other => eprintln!("{} {}", "✗".red().bold(), other),
                }
            }
            if let Some(e) = errors.into_iter().next() {
                if reports.is_empty() {
                    return Err(e.into());
                }
            }
        }

        RiskCommands::Score { tenant, chain, actor_id } => {
            let engine = ctx.engine(&pool);
            let score = engine.get_vertex_score(&tenant, &actor_id, &chain)?;
            if ctx.json {
                return output::print_json(&score);
            }
            output::print_score(&score);
        }

        RiskCommands::Scores { tenant, chain } => {
            let engine = ctx.engine(&pool);
            let scores = engine.list_scores(&tenant, &chain)?;
            if ctx.json {
                return output::print_json(&scores);
            }
            output::print_scores_table(&scores);
        }

        RiskCommands::Runs { tenant, limit } => {
            let runs = chainrisk_core::risk::list_runs(&pool, &tenant, limit)?;
            if ctx.json {
                return output::print_json(&runs);
            }
            output::print_runs_table(&runs);
        }

        RiskCommands::Schedule(args) => {
            let mut config = ctx.config.scheduler.clone();
            if let Some(secs) = args.interval_secs {
                config.interval_secs = secs;
            }

            // Start following the event log before anything below looks at
            // the store, so no write falls between the two.
            let relay = EventRelay::new(pool.clone())?;

            let engine = ctx.engine(&pool);
            let lock = ctx.run_lock(&pool).await?;
            let scheduler = Scheduler::new(engine, lock, config.clone());
            let cancel = scheduler.cancel_flag();

            let mut background: Vec<JoinHandle<()>> = Vec::new();
            if ctx.config.graph.enabled {
                let syncer = GraphSyncer::new(pool.clone(), super::graph::neo4j_mirror(ctx).await?);
                let healed = syncer.sync_all_pending().await;
                info!(
                    upserted = healed.relationships_upserted,
                    removed = healed.relationships_removed,
                    failed = healed.failed,
                    "Startup graph sync done"
                );
                background.push(syncer.clone().spawn());
                background.push(spawn_pending_sync(syncer, config.interval()));
            }

            let (tx, rx) = mpsc::channel(64);
            if config.trigger_on_events {
                background.push(spawn_event_bridge(pool.subscribe(), tx.clone()));
            }
            background.push(relay.spawn(config.event_poll()));

            println!();
            println!("  {} {}", "chainrisk".cyan().bold(), "scheduler".bold());
            println!("  {}  every {}s", "Interval".green(), config.interval_secs);
            println!("  {}  every {}ms", "Events  ".green(), config.event_poll_millis);
            println!(
                "  {}  {}",
                "Graph   ".green(),
                if ctx.config.graph.enabled { "neo4j sync on" } else { "off" }
            );
            println!("  {}  {}", "Database".green(), ctx.db_path().display());
            println!("  {}", "Ctrl+C to stop".dimmed());
            println!();

            let mut handle = tokio::spawn(scheduler.run(rx));
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested, finishing the current run");
                    cancel.cancel();
                    drop(tx);
                    for task in &background {
                        task.abort();
                    }
                    if let Err(e) = handle.await {
                        warn!(error = %e, "Scheduler task ended abnormally");
                    }
                }
                joined = &mut handle => {
                    for task in &background {
                        task.abort();
                    }
                    if let Err(e) = joined {
                        warn!(error = %e, "Scheduler task ended abnormally");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Retry failed or missed mirror projections on the scoring interval.
fn spawn_pending_sync(syncer: GraphSyncer, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The startup sync already covered the first tick.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let result = syncer.sync_all_pending().await;
            if result.failed > 0 {
                warn!(failed = result.failed, "Connections still failing to sync");
            }
        }
    })
}
