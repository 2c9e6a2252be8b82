//! Lineage graph commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;

use chainrisk_core::dag::{Dag, LineageDag};

use super::AppContext;
use crate::output;

#[derive(Subcommand)]
pub enum DagCommands {
    /// Add a parent/child edge; rejected if it would close a cycle
    Link {
        /// Lineage graph name
        #[arg(long, default_value = "batches")]
        graph: String,
        parent: String,
        child: String,
    },

    /// Remove a parent/child edge
    Unlink {
        #[arg(long, default_value = "batches")]
        graph: String,
        parent: String,
        child: String,
    },

    /// Everything below a node
    Descendants {
        #[arg(long, default_value = "batches")]
        graph: String,
        node: String,
        #[arg(long)]
        include_self: bool,
    },

    /// Everything above a node
    Ancestors {
        #[arg(long, default_value = "batches")]
        graph: String,
        node: String,
        #[arg(long)]
        include_self: bool,
    },

    /// Leaves and roots reachable from a node
    Ends {
        #[arg(long, default_value = "batches")]
        graph: String,
        node: String,
    },
}

#[derive(Serialize)]
struct Ends {
    node: String,
    island: bool,
    leaves: Vec<String>,
    roots: Vec<String>,
}

pub fn execute(cmd: DagCommands, ctx: &AppContext) -> Result<()> {
    let pool = ctx.open_db()?;

    match cmd {
        DagCommands::Link { graph, parent, child } => {
            let mut dag = Dag::new(LineageDag::new(pool, graph));
            dag.add_child(&parent, &child)?;
            println!("{} Linked {} -> {}", "✓".green().bold(), parent.cyan(), child.cyan());
        }

        DagCommands::Unlink { graph, parent, child } => {
            let mut dag = Dag::new(LineageDag::new(pool, graph));
            if dag.remove_child(&parent, &child)? {
                println!("{} Unlinked {} -> {}", "✓".green().bold(), parent.cyan(), child.cyan());
            } else {
                println!("{}", "No such edge.".dimmed());
            }
        }

        DagCommands::Descendants { graph, node, include_self } => {
            let dag = Dag::new(LineageDag::new(pool, graph));
            let ids = dag.descendants(&node, include_self)?;
            if ctx.json {
                return output::print_json(&ids);
            }
            output::print_id_list(&format!("Descendants of {}", node), &ids);
        }

        DagCommands::Ancestors { graph, node, include_self } => {
            let dag = Dag::new(LineageDag::new(pool, graph));
            let ids = dag.ancestors(&node, include_self)?;
            if ctx.json {
                return output::print_json(&ids);
            }
            output::print_id_list(&format!("Ancestors of {}", node), &ids);
        }

        DagCommands::Ends { graph, node } => {
            let dag = Dag::new(LineageDag::new(pool, graph));
            let ends = Ends {
                island: dag.is_island(&node)?,
                leaves: dag.leaf_nodes(&node)?,
                roots: dag.root_nodes(&node)?,
                node,
            };
            if ctx.json {
                return output::print_json(&ends);
            }
            if ends.island {
                println!("{} is not linked to anything", ends.node.cyan());
                return Ok(());
            }
            output::print_id_list("Leaves", &ends.leaves);
            output::print_id_list("Roots", &ends.roots);
        }
    }

    Ok(())
}
