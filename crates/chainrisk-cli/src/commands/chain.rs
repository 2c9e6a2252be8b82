//! Supply chain commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::AppContext;
use crate::output;

#[derive(Subcommand)]
pub enum ChainCommands {
    /// Create a supply chain
    Create {
        /// Owning tenant ID
        #[arg(long)]
        tenant: String,

        /// Supply chain name, unique within the tenant
        name: String,
    },

    /// List a tenant's supply chains
    List {
        #[arg(long)]
        tenant: String,
    },
}

pub fn execute(cmd: ChainCommands, ctx: &AppContext) -> Result<()> {
    let pool = ctx.open_db()?;

    match cmd {
        ChainCommands::Create { tenant, name } => {
            let chain = chainrisk_core::supply_chain::create_supply_chain(&pool, &tenant, &name)?;
            if ctx.json {
                return output::print_json(&chain);
            }
            println!(
                "{} Created supply chain: {} ({})",
                "✓".green().bold(),
                chain.name.cyan(),
                chain.id.dimmed()
            );
        }

        ChainCommands::List { tenant } => {
            let chains = chainrisk_core::supply_chain::list_supply_chains(&pool, &tenant)?;
            if ctx.json {
                return output::print_json(&chains);
            }
            output::print_supply_chains_table(&chains);
        }
    }

    Ok(())
}
