//! Connection workflow commands.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use chainrisk_core::connection::model::{ConnectionStatus, Initiation, NewConnection};

use super::AppContext;
use crate::output;

#[derive(Subcommand)]
pub enum ConnectionCommands {
    /// Create a connection between two actors in a supply chain
    Create(CreateConnectionArgs),

    /// Approve a pending or revoked connection
    Activate {
        #[arg(long)]
        tenant: String,
        connection_id: String,
    },

    /// Revoke a connection (the row is kept)
    Revoke {
        #[arg(long)]
        tenant: String,
        connection_id: String,
    },

    /// Show one connection
    Show {
        #[arg(long)]
        tenant: String,
        connection_id: String,
    },

    /// List every connection of a supply chain
    List {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        chain: String,
    },

    /// Buyers and suppliers of an actor in a supply chain
    Actors(ConnectedArgs),

    /// Stop scoring an actor in a supply chain
    Retire {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        chain: String,
        actor_id: String,
    },
}

#[derive(Args)]
pub struct CreateConnectionArgs {
    #[arg(long)]
    pub tenant: String,

    #[arg(long)]
    pub chain: String,

    /// Source actor ID
    pub source: String,

    /// Target actor ID
    pub target: String,

    /// The target supplies the source
    #[arg(long)]
    pub supplier: bool,

    /// The target buys from the source
    #[arg(long)]
    pub buyer: bool,

    /// Create the connection already approved
    #[arg(long)]
    pub approved: bool,

    /// Mark as created by an automated process rather than a user
    #[arg(long)]
    pub system: bool,
}

#[derive(Args)]
pub struct ConnectedArgs {
    #[arg(long)]
    pub tenant: String,

    #[arg(long)]
    pub chain: String,

    /// Actor ID
    pub actor_id: String,

    /// Only buyers
    #[arg(long, conflicts_with = "suppliers")]
    pub buyers: bool,

    /// Only suppliers
    #[arg(long)]
    pub suppliers: bool,

    /// Include revoked connections
    #[arg(long)]
    pub include_revoked: bool,
}

pub fn execute(cmd: ConnectionCommands, ctx: &AppContext) -> Result<()> {
    let pool = ctx.open_db()?;

    match cmd {
        ConnectionCommands::Create(args) => {
            if !args.supplier && !args.buyer {
                bail!("Pass --supplier, --buyer or both to give the connection a direction");
            }
            let new = NewConnection {
                source_id: args.source,
                target_id: args.target,
                supply_chain_id: args.chain,
                is_buyer: args.buyer,
                is_supplier: args.supplier,
                status: if args.approved {
                    ConnectionStatus::Approved
                } else {
                    ConnectionStatus::Pending
                },
                initiation: if args.system { Initiation::System } else { Initiation::Manual },
            };
            let connection = chainrisk_core::connection::create_connection(&pool, &args.tenant, &new)?;
            if ctx.json {
                return output::print_json(&connection);
            }
            println!("{} Created connection {}", "✓".green().bold(), connection.id.dimmed());
            if let Some(pair) = &connection.paired_with {
                println!("  Paired with {}", pair.dimmed());
            }
        }

        ConnectionCommands::Activate { tenant, connection_id } => {
            let connection = chainrisk_core::connection::activate(&pool, &tenant, &connection_id)?;
            if ctx.json {
                return output::print_json(&connection);
            }
            println!("{} Approved connection {}", "✓".green().bold(), connection.id.dimmed());
        }

        ConnectionCommands::Revoke { tenant, connection_id } => {
            let connection = chainrisk_core::connection::revoke(&pool, &tenant, &connection_id)?;
            if ctx.json {
                return output::print_json(&connection);
            }
            println!("{} Revoked connection {}", "✓".green().bold(), connection.id.dimmed());
        }

        ConnectionCommands::Show { tenant, connection_id } => {
            let connection = chainrisk_core::connection::get_connection(&pool, &tenant, &connection_id)?;
            if ctx.json {
                return output::print_json(&connection);
            }
            output::print_connection(&connection);
        }

        ConnectionCommands::List { tenant, chain } => {
            let connections = chainrisk_core::connection::list_connections(&pool, &tenant, &chain)?;
            if ctx.json {
                return output::print_json(&connections);
            }
            output::print_connections_table(&connections);
        }

        ConnectionCommands::Actors(args) => {
            let (want_buyers, want_suppliers) = match (args.buyers, args.suppliers) {
                (false, false) => (true, true),
                flags => flags,
            };
            let actors = chainrisk_core::connection::get_connections(
                &pool,
                &args.tenant,
                &args.actor_id,
                &args.chain,
                want_buyers,
                want_suppliers,
                args.include_revoked,
            )?;
            if ctx.json {
                return output::print_json(&actors);
            }
            output::print_connected_actors(&actors);
        }

        ConnectionCommands::Retire { tenant, chain, actor_id } => {
            chainrisk_core::connection::retire_vertex(&pool, &tenant, &actor_id, &chain)?;
            println!("{} Retired actor {} from supply chain {}", "✓".green().bold(), actor_id.cyan(), chain.dimmed());
        }
    }

    Ok(())
}
