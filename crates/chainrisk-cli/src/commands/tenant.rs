//! Tenant commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::AppContext;
use crate::output;

#[derive(Subcommand)]
pub enum TenantCommands {
    /// Create a tenant
    Create {
        /// Tenant name
        name: String,

        /// Create the reverse connection automatically for every connection
        #[arg(long)]
        symmetric: bool,
    },

    /// List tenants
    List,

    /// Turn automatic connection pairing on or off
    Symmetric {
        /// Tenant ID
        tenant_id: String,

        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

pub fn execute(cmd: TenantCommands, ctx: &AppContext) -> Result<()> {
    let pool = ctx.open_db()?;

    match cmd {
        TenantCommands::Create { name, symmetric } => {
            let tenant = chainrisk_core::tenant::create_tenant(&pool, &name, symmetric)?;
            if ctx.json {
                return output::print_json(&tenant);
            }
            println!(
                "{} Created tenant: {} ({})",
                "✓".green().bold(),
                tenant.name.cyan(),
                tenant.id.dimmed()
            );
        }

        TenantCommands::List => {
            let tenants = chainrisk_core::tenant::list_tenants(&pool)?;
            if ctx.json {
                return output::print_json(&tenants);
            }
            output::print_tenants_table(&tenants);
        }

        TenantCommands::Symmetric { tenant_id, enabled } => {
            let tenant = chainrisk_core::tenant::set_symmetric_connections(&pool, &tenant_id, enabled)?;
            if ctx.json {
                return output::print_json(&tenant);
            }
            println!(
                "{} Symmetric connections {} for {}",
                "✓".green().bold(),
                if enabled { "enabled" } else { "disabled" },
                tenant.name.cyan()
            );
        }
    }

    Ok(())
}
