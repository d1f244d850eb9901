//! Load order computation for discovered packages

use crate::record::PackageRecord;
use crate::{PackageError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Load order computer using a stable topological sort
///
/// Nodes are external names. Dependencies on names that are not part of the
/// graph are dropped when the graph is built, so a package may depend on
/// something that is not installed locally.
#[derive(Debug, Clone)]
pub struct LoadOrderComputer {
    /// Dependency graph: package -> dependencies present in the graph
    graph: BTreeMap<String, BTreeSet<String>>,
}

impl LoadOrderComputer {
    /// Create a new load order computer from discovered records
    pub fn new(records: &[PackageRecord]) -> Self {
        Self::from_graph(
            records
                .iter()
                .map(|r| (r.external_name().to_string(), r.dependencies().clone()))
                .collect(),
        )
    }

    /// Create from a raw dependency graph
    pub fn from_graph(raw: BTreeMap<String, BTreeSet<String>>) -> Self {
        let graph = raw
            .iter()
            .map(|(name, deps)| {
                let known = deps
                    .iter()
                    .filter(|dep| raw.contains_key(dep.as_str()))
                    .cloned()
                    .collect();
                (name.clone(), known)
            })
            .collect();

        Self { graph }
    }

    /// Compute the load order using Kahn's algorithm
    ///
    /// Among packages whose dependencies are all loaded, the lexicographically
    /// smallest external name goes first, so identical input always yields
    /// the identical order.
    pub fn compute_load_order(&self) -> Result<Vec<String>> {
        let mut in_degree = self.compute_in_degrees();
        let dependents = self.compute_dependents();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut result = Vec::with_capacity(self.graph.len());

        while let Some(package) = ready.pop_first() {
            result.push(package.to_string());

            for &dependent in dependents.get(package).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if result.len() != self.graph.len() {
            let remaining = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            return Err(PackageError::CycleDetected(remaining));
        }

        Ok(result)
    }

    /// In-degree = number of dependencies this package is still waiting for
    fn compute_in_degrees(&self) -> BTreeMap<&str, usize> {
        self.graph
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect()
    }

    /// Reverse edges: package -> packages depending on it
    fn compute_dependents(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, deps) in &self.graph {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }
        dependents
    }

    /// Get the dependency graph
    pub fn graph(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.graph
    }

    /// Get the locally present dependencies of a package
    pub fn get_dependencies(&self, package: &str) -> Option<&BTreeSet<String>> {
        self.graph.get(package)
    }

    /// Count of packages in graph
    pub fn package_count(&self) -> usize {
        self.graph.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}
