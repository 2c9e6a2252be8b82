//! chainrisk CLI
//!
//! Seeds tenants, actors and connections, runs the risk propagation engine,
//! and inspects scores and the graph mirror.

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

use commands::{Cli, Commands};

/// Initialize tracing, optionally also writing a daily-rotated log file.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(log_dir: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
    let default_filter = if verbose {
        "chainrisk=debug,chainrisk_core=debug,chainrisk_graph=debug"
    } else {
        "chainrisk=info,chainrisk_core=info,chainrisk_graph=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "chainrisk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            // Stdout is reserved for command output (and --json).
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Risk(commands::risk::RiskCommands::Schedule(args)) => args.log_dir.clone(),
        _ => None,
    };
    let _guard = init_tracing(log_dir.as_deref(), cli.verbose);

    cli.execute().await
}
