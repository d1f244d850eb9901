//! Load order computation tests

use keel_package::{LoadOrderComputer, PackageError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn make_graph(packages: Vec<(&str, Vec<&str>)>) -> LoadOrderComputer {
    LoadOrderComputer::from_graph(
        packages
            .into_iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.into_iter().map(String::from).collect(),
                )
            })
            .collect(),
    )
}

fn position(order: &[String], name: &str) -> usize {
    order.iter().position(|p| p == name).unwrap()
}

#[test]
fn test_dependencies_load_first() {
    // A depends on B, B depends on C
    let computer = make_graph(vec![("A", vec!["B"]), ("B", vec!["C"]), ("C", vec![])]);
    assert_eq!(computer.compute_load_order().unwrap(), vec!["C", "B", "A"]);
}

#[test]
fn test_missing_dependency_ignored() {
    let computer = make_graph(vec![("D", vec!["NotPresent"])]);
    assert_eq!(computer.compute_load_order().unwrap(), vec!["D"]);
}

#[test]
fn test_independent_packages_sorted_by_name() {
    let computer = make_graph(vec![("zeta", vec![]), ("alpha", vec![]), ("mu", vec![])]);
    assert_eq!(
        computer.compute_load_order().unwrap(),
        vec!["alpha", "mu", "zeta"]
    );
}

#[test]
fn test_ready_set_prefers_smallest_name() {
    // "b" becomes ready only after "z"; "c" is ready from the start
    let computer = make_graph(vec![("b", vec!["z"]), ("c", vec![]), ("z", vec![])]);
    assert_eq!(computer.compute_load_order().unwrap(), vec!["c", "z", "b"]);
}

#[test]
fn test_cycle_error_message() {
    let computer = make_graph(vec![("acme/a", vec!["acme/b"]), ("acme/b", vec!["acme/a"])]);
    let err = computer.compute_load_order().unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"Circular dependency detected among packages: acme/a, acme/b"
    );
}

#[test]
fn test_cycle_with_unknown_dependency_still_detected() {
    let computer = make_graph(vec![
        ("a", vec!["b", "external"]),
        ("b", vec!["a"]),
    ]);
    assert!(matches!(
        computer.compute_load_order(),
        Err(PackageError::CycleDetected(_))
    ));
}

/// Acyclic graphs: node i may only depend on nodes with a smaller index
fn acyclic_graph() -> impl Strategy<Value = BTreeMap<String, BTreeSet<String>>> {
    (1usize..24).prop_flat_map(|size| {
        proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), size)
            .prop_map(move |edges| {
                edges
                    .into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let deps = if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks
                                .iter()
                                .map(|pick| format!("pkg{:02}", pick.index(i)))
                                .collect()
                        };
                        (format!("pkg{:02}", i), deps)
                    })
                    .collect()
            })
    })
}

proptest! {
    #[test]
    fn prop_every_dependency_precedes_dependent(graph in acyclic_graph()) {
        let order = LoadOrderComputer::from_graph(graph.clone())
            .compute_load_order()
            .unwrap();

        prop_assert_eq!(order.len(), graph.len());
        for (name, deps) in &graph {
            for dep in deps {
                prop_assert!(position(&order, dep) < position(&order, name));
            }
        }
    }

    #[test]
    fn prop_order_is_deterministic(graph in acyclic_graph()) {
        let first = LoadOrderComputer::from_graph(graph.clone()).compute_load_order().unwrap();
        let second = LoadOrderComputer::from_graph(graph).compute_load_order().unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_back_edge_creates_cycle(graph in acyclic_graph()) {
        // Make the first node depend on every other node; any node with a
        // dependency now closes a cycle through pkg00
        let mut graph = graph;
        let names: Vec<String> = graph.keys().cloned().collect();
        let has_edges = graph.values().any(|deps| deps.contains("pkg00"));
        if let Some(first) = graph.get_mut("pkg00") {
            first.extend(names.into_iter().filter(|n| n != "pkg00"));
        }

        let result = LoadOrderComputer::from_graph(graph).compute_load_order();
        if has_edges {
            prop_assert!(matches!(result, Err(PackageError::CycleDetected(_))), "expected cycle");
        }
    }
}
