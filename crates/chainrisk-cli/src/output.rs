//! Terminal output formatting.

use chainrisk_core::actor::model::Actor;
use chainrisk_core::connection::model::{ConnectedActor, Connection, ConnectionStatus};
use chainrisk_core::risk::{RunReport, ScoreRun, Severity, VertexScore};
use chainrisk_core::supply_chain::model::SupplyChain;
use chainrisk_core::tenant::model::Tenant;
use chainrisk_graph::MirrorVertex;
use colored::{ColoredString, Colorize};
use serde::Serialize;

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_tenants_table(tenants: &[Tenant]) {
    if tenants.is_empty() {
        println!("{}", "No tenants found.".dimmed());
        return;
    }

    println!("{:<36}  {:<30}  {:<9}", "ID", "Name", "Symmetric");
    println!("{}", "─".repeat(79));
    for tenant in tenants {
        println!(
            "{:<36}  {:<30}  {:<9}",
            tenant.id.dimmed(),
            truncate(&tenant.name, 30),
            if tenant.symmetric_connections { "yes".green() } else { "no".normal() }
        );
    }
}

pub fn print_supply_chains_table(chains: &[SupplyChain]) {
    if chains.is_empty() {
        println!("{}", "No supply chains found.".dimmed());
        return;
    }

    println!("{:<36}  {:<40}", "ID", "Name");
    println!("{}", "─".repeat(78));
    for chain in chains {
        println!("{:<36}  {:<40}", chain.id.dimmed(), truncate(&chain.name, 40));
    }
}

pub fn print_actors_table(actors: &[Actor]) {
    if actors.is_empty() {
        println!("{}", "No actors found.".dimmed());
        return;
    }

    println!("{:<36}  {:<28}  {:<9}  {:>8}", "ID", "Name", "Role", "Baseline");
    println!("{}", "─".repeat(87));
    for actor in actors {
        let baseline = actor
            .baseline_risk_score
            .map(|b| format!("{:.2}", b))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36}  {:<28}  {:<9}  {:>8}",
            actor.id.dimmed(),
            truncate(&actor.name, 28),
            actor.role.as_str().cyan(),
            baseline
        );
    }
}

pub fn print_connection(connection: &Connection) {
    println!("{} {}", "Connection".bold(), connection.id.dimmed());
    println!("  {}: {}", "Source".bold(), connection.source_id);
    println!("  {}: {}", "Target".bold(), connection.target_id);
    println!("  {}: {}", "Supply chain".bold(), connection.supply_chain_id);
    println!("  {}: {}", "Direction".bold(), direction(connection.is_buyer, connection.is_supplier));
    println!("  {}: {}", "Status".bold(), status_colored(&connection.status));
    println!("  {}: {}", "Initiation".bold(), connection.initiation.as_str().to_lowercase());
    if let Some(pair) = &connection.paired_with {
        println!("  {}: {}", "Paired with".bold(), pair.dimmed());
    }
}

pub fn print_connections_table(connections: &[Connection]) {
    if connections.is_empty() {
        println!("{}", "No connections found.".dimmed());
        return;
    }

    println!("{:<10}  {:<10}  {:<10}  {:<22}  {:<9}", "ID", "Source", "Target", "Direction", "Status");
    println!("{}", "─".repeat(69));
    for c in connections {
        println!(
            "{:<10}  {:<10}  {:<10}  {:<22}  {}",
            short(&c.id).dimmed(),
            short(&c.source_id),
            short(&c.target_id),
            direction(c.is_buyer, c.is_supplier),
            status_colored(&c.status)
        );
    }
    println!();
    println!("{} connection(s)", connections.len());
}

pub fn print_connected_actors(actors: &[ConnectedActor]) {
    if actors.is_empty() {
        println!("{}", "No connected actors.".dimmed());
        return;
    }

    println!("{:<36}  {:<16}  {:<9}  {:<10}", "Actor", "Relation", "Status", "Via");
    println!("{}", "─".repeat(77));
    for a in actors {
        let relation = match (a.is_supplier, a.is_buyer) {
            (true, true) => "supplier+buyer",
            (true, false) => "supplier",
            (false, true) => "buyer",
            (false, false) => "-",
        };
        println!(
            "{:<36}  {:<16}  {:<9}  {:<10}",
            a.actor_id,
            relation,
            status_colored(&a.status),
            short(&a.connection_id).dimmed()
        );
    }
}

pub fn print_scores_table(scores: &[VertexScore]) {
    if scores.is_empty() {
        println!("{}", "No vertices in this supply chain.".dimmed());
        return;
    }

    println!("{:<36}  {:>8}  {:<8}  {:<25}", "Actor", "Score", "Severity", "Last scored");
    println!("{}", "─".repeat(83));
    for s in scores {
        println!(
            "{:<36}  {:>8.2}  {:<8}  {:<25}",
            s.actor_id,
            s.aggregate_score,
            severity_colored(s.severity),
            s.last_scored_at.as_deref().unwrap_or("never").dimmed()
        );
    }
}

pub fn print_score(score: &VertexScore) {
    println!(
        "{} {:.2} {}",
        "Aggregate score:".bold(),
        score.aggregate_score,
        severity_colored(score.severity)
    );
    println!("  {}: {}", "Vertex".bold(), score.vertex_id.dimmed());
    println!(
        "  {}: {}",
        "Last scored".bold(),
        score.last_scored_at.as_deref().unwrap_or("never")
    );
}

pub fn print_run_report(report: &RunReport) {
    let headline = if report.cancelled {
        "Scoring run cancelled".yellow().bold()
    } else {
        "Scoring run complete".green().bold()
    };
    println!("{} {}", headline, report.run_id.dimmed());
    println!("  Scored:            {}", report.scored);
    println!("  Failed:            {}", report.failed.len());
    println!("  Cyclic components: {}", report.cyclic_components);

    for failure in &report.failed {
        println!(
            "  {} {} ({}): {}",
            "✗".red(),
            short(&failure.actor_id),
            short(&failure.supply_chain_id).dimmed(),
            failure.reason
        );
    }
}

pub fn print_runs_table(runs: &[ScoreRun]) {
    if runs.is_empty() {
        println!("{}", "No scoring runs recorded.".dimmed());
        return;
    }

    println!("{:<10}  {:<25}  {:>6}  {:>6}  {:>6}  {:<9}", "Run", "Started", "Scored", "Failed", "Cycles", "State");
    println!("{}", "─".repeat(75));
    for run in runs {
        let state = match (&run.finished_at, run.cancelled) {
            (None, _) => "running".yellow(),
            (Some(_), true) => "cancelled".red(),
            (Some(_), false) => "done".green(),
        };
        println!(
            "{:<10}  {:<25}  {:>6}  {:>6}  {:>6}  {}",
            short(&run.id).dimmed(),
            run.started_at,
            run.scored,
            run.failed,
            run.cyclic_components,
            state
        );
    }
}

pub fn print_vertices(title: &str, vertices: &[MirrorVertex]) {
    println!("{}", title.bold());
    if vertices.is_empty() {
        println!("  {}", "None.".dimmed());
        return;
    }
    for v in vertices {
        println!(
            "  {} {} {}",
            short(&v.id).dimmed(),
            v.actor_id.cyan(),
            format!("({})", short(&v.supply_chain_id)).dimmed()
        );
    }
}

pub fn print_id_list(title: &str, ids: &[String]) {
    println!("{}", title.bold());
    if ids.is_empty() {
        println!("  {}", "None.".dimmed());
        return;
    }
    for id in ids {
        println!("  {}", id);
    }
}

pub fn severity_colored(severity: Severity) -> ColoredString {
    match severity {
        Severity::High => severity.as_str().red().bold(),
        Severity::Medium => severity.as_str().yellow(),
        Severity::Low => severity.as_str().green(),
    }
}

fn status_colored(status: &ConnectionStatus) -> ColoredString {
    let label = status.as_str().to_lowercase();
    match status {
        ConnectionStatus::Approved => label.green(),
        ConnectionStatus::Pending => label.yellow(),
        ConnectionStatus::Revoked => label.dimmed(),
    }
}

fn direction(is_buyer: bool, is_supplier: bool) -> &'static str {
    match (is_supplier, is_buyer) {
        (true, true) => "supplies + buys",
        (true, false) => "target supplies source",
        (false, true) => "target buys",
        (false, false) => "-",
    }
}

/// First 8 characters of an ID.
fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Truncate a string for display.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Cocoa", 10), "Cocoa");
        assert_eq!(truncate("Cocoa Cooperative", 10), "Cocoa C...");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short("0123456789abcdef"), "01234567");
        assert_eq!(short("abc"), "abc");
    }
}
