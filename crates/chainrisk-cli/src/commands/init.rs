//! Workspace initialization and migrations.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::AppContext;
use crate::config::{ChainriskConfig, CONFIG_FILE_NAME};

#[derive(Args)]
pub struct InitArgs {
    /// Create a first tenant with this name
    #[arg(long)]
    pub tenant: Option<String>,

    /// Pair connections automatically for the new tenant
    #[arg(long, requires = "tenant")]
    pub symmetric: bool,
}

pub fn execute(args: InitArgs, ctx: &AppContext) -> Result<()> {
    let wrote_config = ChainriskConfig::write_default(&ctx.dir)?;
    let pool = ctx.open_db()?;

    if wrote_config {
        println!("{} Wrote {}", "✓".green().bold(), ctx.dir.join(CONFIG_FILE_NAME).display());
    } else {
        println!("{} Keeping existing {}", "→".blue().bold(), CONFIG_FILE_NAME);
    }
    println!("{} Database ready: {}", "✓".green().bold(), ctx.db_path().display());

    if let Some(name) = args.tenant {
        let tenant = chainrisk_core::tenant::create_tenant(&pool, &name, args.symmetric)?;
        println!(
            "{} Created tenant: {} ({})",
            "✓".green().bold(),
            tenant.name.cyan(),
            tenant.id.dimmed()
        );
    }

    println!();
    println!("{}", "Next steps:".bold());
    println!("  chainrisk chain create --tenant <id> <name>");
    println!("  chainrisk actor create --tenant <id> <name> --role producer");
    println!("  chainrisk connection create --tenant <id> --chain <id> <buyer> <supplier> --supplier");
    println!("  chainrisk risk run --tenant <id>");

    Ok(())
}

pub fn migrate(ctx: &AppContext) -> Result<()> {
    // Opening the pool applies every pending migration.
    ctx.open_db()?;
    println!("{} Database migrated: {}", "✓".green().bold(), ctx.db_path().display());
    Ok(())
}
