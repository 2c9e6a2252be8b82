//! Actor commands, including the baseline score feed.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use chainrisk_core::actor::model::ActorRole;

use super::AppContext;
use crate::output;

#[derive(Subcommand)]
pub enum ActorCommands {
    /// Create an actor
    Create(CreateActorArgs),

    /// List a tenant's actors
    List {
        #[arg(long)]
        tenant: String,
    },

    /// Set or clear an actor's baseline risk score
    Baseline {
        /// Actor ID
        actor_id: String,

        /// New baseline risk score
        #[arg(required_unless_present = "clear", allow_negative_numbers = true)]
        score: Option<f64>,

        /// Remove the baseline (scored as 0)
        #[arg(long, conflicts_with = "score")]
        clear: bool,
    },
}

#[derive(Args)]
pub struct CreateActorArgs {
    /// Owning tenant ID
    #[arg(long)]
    pub tenant: String,

    /// Display name
    pub name: String,

    /// producer or company
    #[arg(long, default_value = "company")]
    pub role: String,

    /// Initial baseline risk score
    #[arg(long)]
    pub baseline: Option<f64>,
}

pub fn execute(cmd: ActorCommands, ctx: &AppContext) -> Result<()> {
    let pool = ctx.open_db()?;

    match cmd {
        ActorCommands::Create(args) => {
            let role = ActorRole::parse(&args.role)
                .ok_or_else(|| anyhow!("Unknown role '{}', expected producer or company", args.role))?;
            let actor =
                chainrisk_core::actor::create_actor(&pool, &args.tenant, &args.name, role, args.baseline)?;
            if ctx.json {
                return output::print_json(&actor);
            }
            println!(
                "{} Created {}: {} ({})",
                "✓".green().bold(),
                role.as_str().to_lowercase(),
                actor.name.cyan(),
                actor.id.dimmed()
            );
        }

        ActorCommands::List { tenant } => {
            let actors = chainrisk_core::actor::list_actors(&pool, &tenant)?;
            if ctx.json {
                return output::print_json(&actors);
            }
            output::print_actors_table(&actors);
        }

        ActorCommands::Baseline { actor_id, score, clear } => {
            let score = if clear { None } else { score };
            if let Some(value) = score {
                if !ctx.config.scoring.is_valid_baseline(value) {
                    // Stored anyway; the next run reports it and keeps the old score.
                    eprintln!(
                        "{} {} is outside 0..={}, the vertex will not be rescored",
                        "!".yellow().bold(),
                        value,
                        ctx.config.scoring.max_risk_score
                    );
                }
            }
            let actor = chainrisk_core::actor::set_baseline(&pool, &actor_id, score)?;
            if ctx.json {
                return output::print_json(&actor);
            }
            match actor.baseline_risk_score {
                Some(b) => println!("{} Baseline of {} set to {:.2}", "✓".green().bold(), actor.name.cyan(), b),
                None => println!("{} Baseline of {} cleared", "✓".green().bold(), actor.name.cyan()),
            }
        }
    }

    Ok(())
}
