//! Cycle diagnostics for the supplier graph.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Strongly connected components of more than one actor, each sorted, in
/// order of their smallest member.
///
/// `suppliers` maps an actor to the actors it buys from. Edges to actors not
/// present as keys are ignored.
pub fn cyclic_components(suppliers: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for actor in suppliers.keys() {
        index.insert(actor.as_str(), graph.add_node(actor.as_str()));
    }
    for (actor, list) in suppliers {
        for supplier in list {
            if let (Some(&from), Some(&to)) = (index.get(actor.as_str()), index.get(supplier.as_str())) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut components: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let mut members: Vec<String> = scc.iter().map(|n| graph[*n].to_string()).collect();
            members.sort();
            members
        })
        .collect();
    components.sort();
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(a, s)| (a.to_string(), s.iter().map(|x| x.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_chain_has_no_cycles() {
        let g = graph(&[("e", &["c"]), ("c", &["p"]), ("p", &[])]);
        assert!(cyclic_components(&g).is_empty());
    }

    #[test]
    fn test_two_cycles() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("x", &["y"]),
            ("y", &["z"]),
            ("z", &["x", "a"]),
        ]);
        assert_eq!(
            cyclic_components(&g),
            vec![vec!["a".to_string(), "b".to_string()], vec!["x".into(), "y".into(), "z".into()]]
        );
    }
}
