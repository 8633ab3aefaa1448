//! Operator-declared dependency graph between released packages.
//!
//! The graph may contain cycles (`sa-foo` depends on `sa-bar` and vice
//! versa), so nothing here relies on a topological order. Lookups are plain
//! reverse-adjacency scans over deterministic containers.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

/// Mapping from package name to the set of packages it depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: IndexMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build a graph from declared adjacency lists; duplicates collapse
    pub fn new<I, K, V>(declared: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let edges = declared
            .into_iter()
            .map(|(pkg, deps)| (pkg.into(), deps.into_iter().map(Into::into).collect()))
            .collect();
        DependencyGraph { edges }
    }

    /// Packages with a declared entry, in declaration order
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Direct dependencies of `pkg` (empty for undeclared packages)
    pub fn dependencies(&self, pkg: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(pkg)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Whether `dependent` declares a direct dependency on `dependency`
    pub fn depends_on(&self, dependent: &str, dependency: &str) -> bool {
        self.edges
            .get(dependent)
            .is_some_and(|deps| deps.contains(dependency))
    }

    /// Packages that directly depend on `pkg`, sorted
    pub fn dependents(&self, pkg: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(pkg))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    /// Whether `pkg` lies on a dependency cycle
    pub fn is_circular(&self, pkg: &str) -> bool {
        let mut visited = BTreeSet::new();
        let mut to_visit: Vec<&str> = self.dependencies(pkg).collect();

        while let Some(next) = to_visit.pop() {
            if next == pkg {
                return true;
            }
            if visited.insert(next) {
                to_visit.extend(self.dependencies(next));
            }
        }
        false
    }
}

/// For each package `P` in `selected`, the packages whose pin on `P` must be
/// rewritten: exactly `{ Q : P in graph[Q] }`.
///
/// Every selected package gets an entry, possibly empty.
pub fn dependents_to_update(
    graph: &DependencyGraph,
    selected: &BTreeSet<String>,
) -> BTreeMap<String, BTreeSet<String>> {
    selected
        .iter()
        .map(|pkg| (pkg.clone(), graph.dependents(pkg)))
        .collect()
}
