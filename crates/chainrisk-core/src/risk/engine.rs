//! Risk propagation over the (possibly cyclic) supplier graph.
//!
//! Each active vertex scores `(supply contribution + baseline) / 2`, where the
//! supply contribution is the mean score of its approved, active suppliers. A
//! vertex with no such supplier contributes `max_risk_score` if it is a
//! producer and 0 otherwise.
//!
//! Traversal is depth-first on an explicit frame stack. A supplier met while
//! it is still on the stack contributes its baseline instead of being entered
//! again, which is what makes cycles terminate. Supply chains, vertices and
//! suppliers are visited in ID order, so the result of a run is deterministic.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chainrisk_db::queries::connections::{self as connection_queries, ConnectionRow};
use chainrisk_db::queries::vertices::{self, ScoringVertexRow};
use chainrisk_db::queries::score_runs;
use chainrisk_db::DbPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cycles::cyclic_components;
use super::model::{RunReport, ScoringConfig, ScoringFailure, Severity, VertexScore};
use crate::actor::model::ActorRole;
use crate::connection::connected_actors;
use crate::connection::model::ConnectionStatus;
use crate::error::{ChainError, ChainResult};

/// Cooperative cancellation for a run. Checked before each top-level vertex.
///
/// A flag made with [`CancelFlag::child`] is also cancelled by its parent,
/// while cancelling the child leaves the parent alone.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    /// This flag's own bit first, then its ancestors'.
    chain: Vec<Arc<AtomicBool>>,
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self {
            chain: vec![Arc::new(AtomicBool::new(false))],
        }
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(Arc::new(AtomicBool::new(false)));
        chain.extend(self.chain.iter().cloned());
        Self { chain }
    }

    pub fn cancel(&self) {
        self.chain[0].store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain.iter().any(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Scores every active vertex of a tenant and persists the results.
#[derive(Clone)]
pub struct RiskEngine {
    pool: DbPool,
    config: ScoringConfig,
}

impl RiskEngine {
    pub fn new(pool: DbPool, config: ScoringConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run a full pass for one tenant.
    ///
    /// Per-vertex failures are collected in the report and do not stop the
    /// run. Vertices persisted before a cancellation keep their new scores.
    pub fn run_for_tenant(&self, tenant_id: &str, cancel: &CancelFlag) -> ChainResult<RunReport> {
        crate::tenant::get_tenant(&self.pool, tenant_id)?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = chainrisk_db::now_rfc3339();
        score_runs::start_run(&self.pool, &run_id, tenant_id, &started_at)?;
        info!(tenant_id, run_id = %run_id, "Scoring run started");

        let mut report = RunReport {
            run_id,
            tenant_id: tenant_id.to_string(),
            scored: 0,
            failed: Vec::new(),
            cyclic_components: 0,
            cancelled: false,
            started_at,
            finished_at: String::new(),
        };

        let chains = crate::supply_chain::list_supply_chains(&self.pool, tenant_id)?;
        for chain in &chains {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.run_supply_chain(&chain.id, cancel, &mut report)?;
            if report.cancelled {
                break;
            }
        }

        report.finished_at = chainrisk_db::now_rfc3339();
        score_runs::finish_run(
            &self.pool,
            &report.run_id,
            &report.finished_at,
            report.scored as i64,
            report.failed.len() as i64,
            report.cyclic_components as i64,
            report.cancelled,
        )?;

        info!(
            tenant_id,
            run_id = %report.run_id,
            scored = report.scored,
            failed = report.failed.len(),
            cyclic_components = report.cyclic_components,
            cancelled = report.cancelled,
            "Scoring run finished"
        );
        Ok(report)
    }

    /// Stored aggregate score of an actor in a supply chain.
    pub fn get_score(&self, tenant_id: &str, actor_id: &str, supply_chain_id: &str) -> ChainResult<f64> {
        Ok(self.get_vertex_score(tenant_id, actor_id, supply_chain_id)?.aggregate_score)
    }

    /// Stored score with its severity band.
    pub fn get_vertex_score(
        &self,
        tenant_id: &str,
        actor_id: &str,
        supply_chain_id: &str,
    ) -> ChainResult<VertexScore> {
        crate::actor::get_tenant_actor(&self.pool, tenant_id, actor_id)?;
        crate::supply_chain::get_tenant_supply_chain(&self.pool, tenant_id, supply_chain_id)?;

        let vertex = vertices::find_vertex(&self.pool, actor_id, supply_chain_id)?.ok_or_else(|| {
            ChainError::VertexNotFound {
                actor_id: actor_id.to_string(),
                supply_chain_id: supply_chain_id.to_string(),
            }
        })?;

        Ok(VertexScore {
            severity: Severity::from_score(vertex.aggregate_score, &self.config),
            vertex_id: vertex.id,
            actor_id: vertex.actor_id,
            supply_chain_id: vertex.supply_chain_id,
            aggregate_score: vertex.aggregate_score,
            last_scored_at: vertex.last_scored_at,
        })
    }

    /// Stored scores of every vertex in a supply chain, ordered by vertex ID.
    pub fn list_scores(&self, tenant_id: &str, supply_chain_id: &str) -> ChainResult<Vec<VertexScore>> {
        crate::supply_chain::get_tenant_supply_chain(&self.pool, tenant_id, supply_chain_id)?;
        let rows = vertices::list_vertices(&self.pool, supply_chain_id)?;
        Ok(rows
            .into_iter()
            .map(|v| VertexScore {
                severity: Severity::from_score(v.aggregate_score, &self.config),
                vertex_id: v.id,
                actor_id: v.actor_id,
                supply_chain_id: v.supply_chain_id,
                aggregate_score: v.aggregate_score,
                last_scored_at: v.last_scored_at,
            })
            .collect())
    }

    fn run_supply_chain(&self, supply_chain_id: &str, cancel: &CancelFlag, report: &mut RunReport) -> ChainResult<()> {
        let rows = vertices::list_scoring_vertices(&self.pool, supply_chain_id)?;
        let connections = connection_queries::list_connections(&self.pool, supply_chain_id)?;
        let graph = SupplierGraph::build(rows, &connections);

        let cycles = cyclic_components(&graph.suppliers);
        for component in &cycles {
            debug!(supply_chain_id, members = ?component, "Cyclic supplier component");
        }
        report.cyclic_components += cycles.len();

        let mut pass = Pass::new(&self.pool, &self.config, &graph);
        for actor_id in &graph.order {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            pass.score_from(actor_id);
        }

        debug!(supply_chain_id, scored = pass.scored, failed = pass.failed.len(), "Supply chain scored");
        report.scored += pass.scored;
        report.failed.append(&mut pass.failed);
        Ok(())
    }
}

/// Active vertices of one supply chain and their approved, active suppliers.
struct SupplierGraph {
    /// Keyed by actor ID; an actor has one vertex per supply chain.
    vertices: BTreeMap<String, ScoringVertexRow>,
    /// Actor IDs in vertex ID order, the order top-level traversals start in.
    order: Vec<String>,
    /// Actor ID to supplier actor IDs, sorted.
    suppliers: BTreeMap<String, Vec<String>>,
}

impl SupplierGraph {
    fn build(mut rows: Vec<ScoringVertexRow>, connections: &[ConnectionRow]) -> Self {
        rows.sort_by(|a, b| a.vertex_id.cmp(&b.vertex_id));
        let order: Vec<String> = rows.iter().filter(|v| v.active).map(|v| v.actor_id.clone()).collect();
        let vertices: BTreeMap<String, ScoringVertexRow> = rows
            .into_iter()
            .filter(|v| v.active)
            .map(|v| (v.actor_id.clone(), v))
            .collect();

        let mut by_actor: HashMap<&str, Vec<ConnectionRow>> = HashMap::new();
        for row in connections {
            by_actor.entry(row.source_id.as_str()).or_default().push(row.clone());
            by_actor.entry(row.target_id.as_str()).or_default().push(row.clone());
        }

        let mut suppliers = BTreeMap::new();
        for actor_id in vertices.keys() {
            let rows = by_actor.get(actor_id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let list: Vec<String> = connected_actors(rows, actor_id, false, true, false)
                .into_iter()
                .filter(|c| c.status == ConnectionStatus::Approved && vertices.contains_key(&c.actor_id))
                .map(|c| c.actor_id)
                .collect();
            suppliers.insert(actor_id.clone(), list);
        }

        Self {
            vertices,
            order,
            suppliers,
        }
    }
}

struct Frame<'g> {
    actor_id: &'g str,
    baseline: f64,
    suppliers: &'g [String],
    next: usize,
    sum: f64,
}

/// State of one supply chain pass.
struct Pass<'a> {
    pool: &'a DbPool,
    config: &'a ScoringConfig,
    graph: &'a SupplierGraph,
    /// Score dependents use: the new score, or the stored one for failures.
    resolved: HashMap<&'a str, f64>,
    in_progress: HashSet<&'a str>,
    scored: usize,
    failed: Vec<ScoringFailure>,
}

impl<'a> Pass<'a> {
    fn new(pool: &'a DbPool, config: &'a ScoringConfig, graph: &'a SupplierGraph) -> Self {
        Self {
            pool,
            config,
            graph,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
            scored: 0,
            failed: Vec::new(),
        }
    }

    fn score_from(&mut self, root: &'a str) {
        if self.resolved.contains_key(root) {
            return;
        }

        let mut stack: Vec<Frame<'a>> = Vec::new();
        if let Some(frame) = self.enter(root) {
            stack.push(frame);
        }

        while let Some(top) = stack.last_mut() {
            let suppliers = top.suppliers;
            if let Some(supplier) = suppliers.get(top.next) {
                let supplier = supplier.as_str();
                if let Some(score) = self.resolved.get(supplier) {
                    top.sum += score;
                    top.next += 1;
                } else if self.in_progress.contains(supplier) {
                    top.sum += self.baseline_of(supplier);
                    top.next += 1;
                } else if let Some(frame) = self.enter(supplier) {
                    stack.push(frame);
                }
                // A supplier that failed to enter is resolved now; the next
                // iteration picks up its stored score.
                continue;
            }

            if let Some(frame) = stack.pop() {
                self.finish(frame);
            }
        }
    }

    /// Start a vertex, or resolve it to its stored score if it cannot be scored.
    fn enter(&mut self, actor_id: &'a str) -> Option<Frame<'a>> {
        let graph = self.graph;
        let vertex = graph.vertices.get(actor_id)?;
        let baseline = vertex.baseline_risk_score.unwrap_or(0.0);

        if !self.config.is_valid_baseline(baseline) {
            self.fail(vertex, format!("malformed baseline risk score {}", baseline));
            return None;
        }

        self.in_progress.insert(actor_id);
        let suppliers = graph.suppliers.get(actor_id).map(Vec::as_slice).unwrap_or(&[]);
        Some(Frame {
            actor_id,
            baseline,
            suppliers,
            next: 0,
            sum: 0.0,
        })
    }

    fn finish(&mut self, frame: Frame<'a>) {
        self.in_progress.remove(frame.actor_id);
        let graph = self.graph;
        let Some(vertex) = graph.vertices.get(frame.actor_id) else {
            return;
        };

        let contribution = if frame.suppliers.is_empty() {
            match ActorRole::from_str(&vertex.role) {
                ActorRole::Producer => self.config.max_risk_score,
                ActorRole::Company => 0.0,
            }
        } else {
            frame.sum / frame.suppliers.len() as f64
        };
        let score = (contribution + frame.baseline) / 2.0;

        match vertices::update_score(self.pool, &vertex.vertex_id, score, &chainrisk_db::now_rfc3339()) {
            Ok(()) => {
                self.resolved.insert(frame.actor_id, score);
                self.scored += 1;
            }
            Err(e) => self.fail(vertex, format!("failed to persist score: {}", e)),
        }
    }

    fn fail(&mut self, vertex: &'a ScoringVertexRow, reason: String) {
        warn!(
            vertex_id = %vertex.vertex_id,
            actor_id = %vertex.actor_id,
            reason = %reason,
            "Vertex not scored, keeping previous score"
        );
        self.resolved.insert(vertex.actor_id.as_str(), vertex.aggregate_score);
        self.failed.push(ScoringFailure {
            vertex_id: vertex.vertex_id.clone(),
            actor_id: vertex.actor_id.clone(),
            supply_chain_id: vertex.supply_chain_id.clone(),
            reason,
        });
    }

    /// Baseline of a vertex currently on the stack. Only valid baselines get
    /// there, so no check is needed.
    fn baseline_of(&self, actor_id: &str) -> f64 {
        self.graph
            .vertices
            .get(actor_id)
            .and_then(|v| v.baseline_risk_score)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(actor: &str, role: &str, baseline: Option<f64>) -> ScoringVertexRow {
        ScoringVertexRow {
            vertex_id: format!("v-{}", actor),
            actor_id: actor.to_string(),
            supply_chain_id: "sc".to_string(),
            role: role.to_string(),
            baseline_risk_score: baseline,
            aggregate_score: 0.0,
            active: true,
        }
    }

    fn supplies(buyer: &str, supplier: &str, status: &str) -> ConnectionRow {
        ConnectionRow {
            id: format!("c-{}-{}", buyer, supplier),
            source_id: buyer.to_string(),
            target_id: supplier.to_string(),
            supply_chain_id: "sc".to_string(),
            is_buyer: false,
            is_supplier: true,
            status: status.to_string(),
            initiation: "MANUAL".to_string(),
            paired_with: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_supplier_graph_keeps_only_approved_active() {
        let mut retired = vertex("r", "COMPANY", None);
        retired.active = false;
        let graph = SupplierGraph::build(
            vec![vertex("a", "COMPANY", None), vertex("b", "PRODUCER", None), vertex("p", "PRODUCER", None), retired],
            &[
                supplies("a", "b", "APPROVED"),
                supplies("a", "p", "PENDING"),
                supplies("a", "r", "APPROVED"),
            ],
        );

        assert_eq!(graph.suppliers["a"], vec!["b".to_string()]);
        assert!(graph.suppliers["b"].is_empty());
        assert!(!graph.vertices.contains_key("r"));
        assert_eq!(graph.order, vec!["a", "b", "p"]);
    }

    mod propagation {
        use super::super::*;
        use crate::actor::{self, model::ActorRole};
        use crate::connection::{self, model::NewConnection};
        use crate::{supply_chain, tenant};

        struct Fixture {
            engine: RiskEngine,
            tenant_id: String,
            chain_id: String,
        }

        impl Fixture {
            fn new(pool: DbPool) -> Self {
                let tenant = tenant::create_tenant(&pool, "Acme", false).unwrap();
                let chain = supply_chain::create_supply_chain(&pool, &tenant.id, "Cocoa").unwrap();
                Self {
                    engine: RiskEngine::new(pool, ScoringConfig::default()),
                    tenant_id: tenant.id,
                    chain_id: chain.id,
                }
            }

            fn actor(&self, name: &str, role: ActorRole, baseline: f64) -> String {
                actor::create_actor(self.engine.pool(), &self.tenant_id, name, role, Some(baseline))
                    .unwrap()
                    .id
            }

            /// `buyer` buys from `supplier`; returns the approved connection ID.
            fn supplies(&self, buyer: &str, supplier: &str) -> String {
                let pool = self.engine.pool();
                let conn = connection::create_connection(
                    pool,
                    &self.tenant_id,
                    &NewConnection::supplier(buyer, supplier, &self.chain_id),
                )
                .unwrap();
                connection::activate(pool, &self.tenant_id, &conn.id).unwrap();
                conn.id
            }

            fn run(&self) -> RunReport {
                self.engine.run_for_tenant(&self.tenant_id, &CancelFlag::new()).unwrap()
            }

            fn score(&self, actor_id: &str) -> f64 {
                self.engine.get_score(&self.tenant_id, actor_id, &self.chain_id).unwrap()
            }
        }

        fn fixture() -> Fixture {
            Fixture::new(chainrisk_db::init_in_memory().unwrap())
        }

        #[test]
        fn test_linear_chain() {
            let f = fixture();
            let farm = f.actor("Farm", ActorRole::Producer, 80.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            let brand = f.actor("Brand", ActorRole::Company, 40.0);
            f.supplies(&mill, &farm);
            f.supplies(&brand, &mill);

            let report = f.run();
            assert_eq!(report.scored, 3);
            assert!(report.failed.is_empty());
            assert_eq!(report.cyclic_components, 0);

            assert_eq!(f.score(&farm), 90.0);
            assert_eq!(f.score(&mill), 75.0);
            assert_eq!(f.score(&brand), 57.5);

            let brand_score = f.engine.get_vertex_score(&f.tenant_id, &brand, &f.chain_id).unwrap();
            assert_eq!(brand_score.severity, Severity::Medium);
            assert!(brand_score.last_scored_at.is_some());
        }

        #[test]
        fn test_company_without_suppliers_contributes_zero() {
            let f = fixture();
            let trader = f.actor("Trader", ActorRole::Company, 50.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            f.supplies(&mill, &trader);

            f.run();
            assert_eq!(f.score(&trader), 25.0);
            assert_eq!(f.score(&mill), 42.5);
        }

        #[test]
        fn test_mean_over_suppliers() {
            let f = fixture();
            let a = f.actor("Farm A", ActorRole::Producer, 100.0);
            let b = f.actor("Farm B", ActorRole::Producer, 0.0);
            let buyer = f.actor("Buyer", ActorRole::Company, 20.0);
            f.supplies(&buyer, &a);
            f.supplies(&buyer, &b);

            f.run();
            assert_eq!(f.score(&a), 100.0);
            assert_eq!(f.score(&b), 50.0);
            assert_eq!(f.score(&buyer), (75.0 + 20.0) / 2.0);
        }

        #[test]
        fn test_two_actor_cycle_uses_baseline() {
            let f = fixture();
            let a = f.actor("A", ActorRole::Company, 80.0);
            let b = f.actor("B", ActorRole::Company, 40.0);
            f.supplies(&a, &b);
            f.supplies(&b, &a);

            let report = f.run();
            assert_eq!(report.scored, 2);
            assert_eq!(report.cyclic_components, 1);

            // The traversal starts at the lower vertex ID and meets the other
            // end of the cycle while it is still in progress.
            let vertex_of = |actor: &str| {
                f.engine
                    .get_vertex_score(&f.tenant_id, actor, &f.chain_id)
                    .unwrap()
                    .vertex_id
            };
            if vertex_of(&a) < vertex_of(&b) {
                assert_eq!(f.score(&b), 60.0);
                assert_eq!(f.score(&a), 70.0);
            } else {
                assert_eq!(f.score(&a), 60.0);
                assert_eq!(f.score(&b), 50.0);
            }

            // Same inputs, same result.
            let (first_a, first_b) = (f.score(&a), f.score(&b));
            f.run();
            assert_eq!((f.score(&a), f.score(&b)), (first_a, first_b));
        }

        #[test]
        fn test_revoked_supplier_is_ignored() {
            let f = fixture();
            let farm = f.actor("Farm", ActorRole::Producer, 80.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            let conn = f.supplies(&mill, &farm);

            f.run();
            assert_eq!(f.score(&mill), 75.0);

            connection::revoke(f.engine.pool(), &f.tenant_id, &conn).unwrap();
            f.run();
            assert_eq!(f.score(&mill), 30.0);
        }

        #[test]
        fn test_pending_supplier_is_ignored() {
            let f = fixture();
            let farm = f.actor("Farm", ActorRole::Producer, 80.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            connection::create_connection(
                f.engine.pool(),
                &f.tenant_id,
                &NewConnection::supplier(&mill, &farm, &f.chain_id),
            )
            .unwrap();

            f.run();
            assert_eq!(f.score(&mill), 30.0);
        }

        #[test]
        fn test_retired_vertex_is_skipped() {
            let f = fixture();
            let farm = f.actor("Farm", ActorRole::Producer, 80.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            f.supplies(&mill, &farm);
            connection::retire_vertex(f.engine.pool(), &f.tenant_id, &farm, &f.chain_id).unwrap();

            let report = f.run();
            assert_eq!(report.scored, 1);
            assert_eq!(f.score(&mill), 30.0);
            assert_eq!(f.score(&farm), 0.0);
        }

        #[test]
        fn test_malformed_baseline_keeps_previous_score() {
            let f = fixture();
            let farm = f.actor("Farm", ActorRole::Producer, 80.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            f.supplies(&mill, &farm);
            f.run();
            assert_eq!(f.score(&farm), 90.0);

            actor::set_baseline(f.engine.pool(), &farm, Some(150.0)).unwrap();
            actor::set_baseline(f.engine.pool(), &mill, Some(20.0)).unwrap();
            let report = f.run();

            assert_eq!(report.scored, 1);
            assert_eq!(report.failed.len(), 1);
            assert_eq!(report.failed[0].actor_id, farm);
            assert_eq!(f.score(&farm), 90.0);
            // Dependents read the kept score.
            assert_eq!(f.score(&mill), 55.0);
        }

        #[test]
        fn test_tenants_are_isolated() {
            let f = fixture();
            let farm = f.actor("Farm", ActorRole::Producer, 80.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            f.supplies(&mill, &farm);

            let pool = f.engine.pool();
            let other = tenant::create_tenant(pool, "Globex", false).unwrap();
            let other_chain = supply_chain::create_supply_chain(pool, &other.id, "Coffee").unwrap();
            let x = actor::create_actor(pool, &other.id, "X", ActorRole::Producer, Some(10.0)).unwrap();
            let y = actor::create_actor(pool, &other.id, "Y", ActorRole::Company, Some(10.0)).unwrap();
            let conn = connection::create_connection(
                pool,
                &other.id,
                &NewConnection::supplier(&y.id, &x.id, &other_chain.id),
            )
            .unwrap();
            connection::activate(pool, &other.id, &conn.id).unwrap();

            let report = f.run();
            assert_eq!(report.scored, 2);
            assert_eq!(f.engine.get_score(&other.id, &x.id, &other_chain.id).unwrap(), 0.0);

            // Another tenant's actor is not visible through this tenant.
            let err = f.engine.get_score(&f.tenant_id, &x.id, &other_chain.id).unwrap_err();
            assert!(matches!(err, ChainError::ActorNotFound(_)));
        }

        #[test]
        fn test_cancelled_run_is_recorded() {
            let f = fixture();
            let farm = f.actor("Farm", ActorRole::Producer, 80.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            f.supplies(&mill, &farm);

            let cancel = CancelFlag::new();
            cancel.cancel();
            let report = f.engine.run_for_tenant(&f.tenant_id, &cancel).unwrap();
            assert!(report.cancelled);
            assert_eq!(report.scored, 0);
            assert_eq!(f.score(&farm), 0.0);

            let runs = crate::risk::list_runs(f.engine.pool(), &f.tenant_id, 10).unwrap();
            assert_eq!(runs.len(), 1);
            assert!(runs[0].cancelled);
            assert!(runs[0].finished_at.is_some());
        }

        #[test]
        fn test_scores_survive_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("chainrisk.db");

            let (tenant_id, chain_id, mill) = {
                let f = Fixture::new(chainrisk_db::init_pool(&path).unwrap());
                let farm = f.actor("Farm", ActorRole::Producer, 80.0);
                let mill = f.actor("Mill", ActorRole::Company, 60.0);
                f.supplies(&mill, &farm);
                f.run();
                (f.tenant_id.clone(), f.chain_id.clone(), mill)
            };

            let engine = RiskEngine::new(chainrisk_db::init_pool(&path).unwrap(), ScoringConfig::default());
            assert_eq!(engine.get_score(&tenant_id, &mill, &chain_id).unwrap(), 75.0);

            let runs = crate::risk::list_runs(engine.pool(), &tenant_id, 10).unwrap();
            assert_eq!(runs.len(), 1);
            assert_eq!(runs[0].scored, 2);
            assert!(!runs[0].cancelled);
        }

        #[test]
        fn test_list_scores_and_unknown_tenant() {
            let f = fixture();
            let farm = f.actor("Farm", ActorRole::Producer, 80.0);
            let mill = f.actor("Mill", ActorRole::Company, 60.0);
            f.supplies(&mill, &farm);
            f.run();

            let scores = f.engine.list_scores(&f.tenant_id, &f.chain_id).unwrap();
            assert_eq!(scores.len(), 2);
            assert!(scores.windows(2).all(|w| w[0].vertex_id < w[1].vertex_id));

            let err = f.engine.run_for_tenant("missing", &CancelFlag::new()).unwrap_err();
            assert!(matches!(err, ChainError::TenantNotFound(_)));
        }
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_child_flag_follows_parent_only() {
        let parent = CancelFlag::new();
        let first = parent.child();
        let second = parent.child();

        first.cancel();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!parent.is_cancelled());

        parent.cancel();
        assert!(second.is_cancelled());
    }
}
