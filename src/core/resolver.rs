//! Dependency resolution
//!
//! Computes the compile order of a catalog: libraries are sorted by their
//! required-library edges, and files inside a library are sorted so package and
//! entity providers come before their users. Library cycles are fatal; file
//! cycles inside one library fall back to declaration order.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use crate::core::catalog::{Catalog, SourceFile};
use crate::core::hdl_scan::{HdlFacts, VhdlScanner};
use crate::core::plan::{BuildPlan, CompileUnit};
use crate::error::ResolverError;

/// Directed graph over named nodes, edges point from consumer to provider
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Node names in insertion order
    nodes: Vec<String>,
    /// Name → insertion index
    index: HashMap<String, usize>,
    /// Providers of each node
    dependencies: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its index; existing nodes keep their position
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.dependencies.push(BTreeSet::new());
        idx
    }

    /// Record that `consumer` requires `provider` first
    pub fn add_dependency(&mut self, consumer: &str, provider: &str) {
        let c = self.add_node(consumer);
        let p = self.add_node(provider);
        if c != p {
            self.dependencies[c].insert(p);
        }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compute a stable topological order (providers first)
    ///
    /// Among nodes that are ready at the same time, the one inserted first wins.
    pub fn topological_sort(&self) -> Result<Vec<String>, ResolverError> {
        self.sort_indices()
            .map(|order| order.into_iter().map(|i| self.nodes[i].clone()).collect())
            .map_err(|cycle| ResolverError::CyclicDependency {
                libraries: cycle.into_iter().map(|i| self.nodes[i].clone()).collect(),
            })
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.sort_indices().is_err()
    }

    /// Kahn's algorithm over insertion indices; `Err` carries one cycle
    fn sort_indices(&self) -> Result<Vec<usize>, Vec<usize>> {
        let n = self.nodes.len();
        let mut pending: Vec<usize> = self.dependencies.iter().map(BTreeSet::len).collect();
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (consumer, providers) in self.dependencies.iter().enumerate() {
            for &provider in providers {
                consumers[provider].push(consumer);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &consumer in &consumers[next] {
                pending[consumer] -= 1;
                if pending[consumer] == 0 {
                    ready.insert(consumer);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            let blocked: BTreeSet<usize> = (0..n).filter(|&i| pending[i] > 0).collect();
            Err(self.find_cycle(&blocked))
        }
    }

    /// Walk dependency edges inside `blocked` until a node repeats
    fn find_cycle(&self, blocked: &BTreeSet<usize>) -> Vec<usize> {
        let Some(&start) = blocked.first() else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            // Every blocked node has at least one blocked provider
            let Some(&next) = self.dependencies[current]
                .iter()
                .find(|p| blocked.contains(p))
            else {
                return path;
            };
            if let Some(pos) = path.iter().position(|&p| p == next) {
                let mut cycle = path.split_off(pos);
                cycle.sort_unstable();
                return cycle;
            }
            path.push(next);
            current = next;
        }
    }
}

/// Resolve the compile order of a catalog, scanning VHDL sources from disk
///
/// # Errors
///
/// Returns `ResolverError::MissingSource` if a scannable file cannot be read and
/// `ResolverError::CyclicDependency` if libraries depend on each other.
pub fn resolve(catalog: &Catalog) -> Result<BuildPlan, ResolverError> {
    let scanner = VhdlScanner::new()?;
    let mut facts = HashMap::new();

    for file in catalog.files() {
        if !file.kind.supports_dependency_scan() {
            continue;
        }
        let bytes = std::fs::read(&file.path).map_err(|e| ResolverError::MissingSource {
            path: file.path.clone(),
            error: e.to_string(),
        })?;
        // VHDL-93 sources are Latin-1; identifiers are ASCII either way
        let text = String::from_utf8_lossy(&bytes);
        facts.insert(file.path.clone(), scanner.scan(&text));
    }

    resolve_with_facts(catalog, &facts)
}

/// Resolve the compile order from already-extracted facts
///
/// Files without facts have no inferred requirements.
pub fn resolve_with_facts(
    catalog: &Catalog,
    facts: &HashMap<PathBuf, HdlFacts>,
) -> Result<BuildPlan, ResolverError> {
    let library_order = library_graph(catalog, facts).topological_sort()?;
    tracing::debug!("Library compile order: {}", library_order.join(", "));

    let units = library_order
        .into_iter()
        .map(|library| {
            let files = order_library_files(&library, catalog.files_for(&library), facts);
            CompileUnit { library, files }
        })
        .collect();

    Ok(BuildPlan::new(units))
}

fn library_graph(catalog: &Catalog, facts: &HashMap<PathBuf, HdlFacts>) -> DependencyGraph {
    let known: BTreeSet<&str> = catalog.all_libraries().into_iter().collect();
    let mut graph = DependencyGraph::new();
    for library in catalog.all_libraries() {
        graph.add_node(library);
    }

    for file in catalog.files() {
        let inferred = facts
            .get(&file.path)
            .map(|f| f.required_libraries(&file.library))
            .unwrap_or_default();

        for required in inferred.iter().chain(file.depends_on.iter()) {
            if required == &file.library {
                continue;
            }
            if known.contains(required.as_str()) {
                graph.add_dependency(&file.library, required);
            } else {
                tracing::debug!(
                    "{} requires library '{required}' not in catalog; assuming precompiled",
                    file.display_name()
                );
            }
        }
    }

    graph
}

fn order_library_files(
    library: &str,
    files: &[SourceFile],
    facts: &HashMap<PathBuf, HdlFacts>,
) -> Vec<SourceFile> {
    let mut providers: HashMap<&str, usize> = HashMap::new();
    for (idx, file) in files.iter().enumerate() {
        if let Some(f) = facts.get(&file.path) {
            for unit in f.provided_units() {
                providers.entry(unit.as_str()).or_insert(idx);
            }
        }
    }

    let mut graph = DependencyGraph::new();
    let keys: Vec<String> = (0..files.len()).map(|i| i.to_string()).collect();
    for key in &keys {
        graph.add_node(key);
    }
    for (idx, file) in files.iter().enumerate() {
        let Some(f) = facts.get(&file.path) else {
            continue;
        };
        for unit in f.local_references(library) {
            if let Some(&provider) = providers.get(unit.as_str()) {
                graph.add_dependency(&keys[idx], &keys[provider]);
            }
        }
    }

    match graph.sort_indices() {
        Ok(order) => order.into_iter().map(|i| files[i].clone()).collect(),
        Err(cycle) => {
            let names: Vec<String> = cycle.iter().map(|&i| files[i].display_name()).collect();
            tracing::warn!(
                "Circular unit references in library '{library}' ({}); using declaration order",
                names.join(", ")
            );
            files.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::SourceAttributes;
    use crate::core::hdl_scan::UnitRef;

    #[test]
    fn test_simple_dependency_order() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("app", "lib");

        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec!["lib", "app"]);
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node("c");
        graph.add_node("a");
        graph.add_node("b");
        graph.add_dependency("c", "b");

        assert_eq!(graph.topological_sort().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let mut graph = DependencyGraph::new();
        graph.add_node("root");
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph.add_dependency("c", "a");
        graph.add_dependency("d", "a");

        assert!(graph.has_cycle());
        let err = graph.topological_sort().unwrap_err();
        assert_eq!(
            err,
            ResolverError::CyclicDependency {
                libraries: vec!["a".into(), "b".into(), "c".into()],
            }
        );
    }

    #[test]
    fn test_self_dependency_ignored() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "a");
        assert!(!graph.has_cycle());
    }

    fn facts_providing(package: &str) -> HdlFacts {
        let mut facts = HdlFacts::default();
        facts.packages.insert(package.to_string());
        facts
    }

    fn facts_using(library: &str, package: &str) -> HdlFacts {
        let mut facts = HdlFacts::default();
        facts.uses.insert(UnitRef {
            library: Some(library.to_string()),
            unit: package.to_string(),
        });
        facts
    }

    #[test]
    fn test_package_provider_first_within_library() {
        let mut catalog = Catalog::new("/p");
        catalog.register("comp.vhd", "l1", SourceAttributes::new()).unwrap();
        catalog.register("pkg.vhd", "l1", SourceAttributes::new()).unwrap();

        let facts = HashMap::from([
            (PathBuf::from("/p/comp.vhd"), facts_using("work", "p")),
            (PathBuf::from("/p/pkg.vhd"), facts_providing("p")),
        ]);

        let plan = resolve_with_facts(&catalog, &facts).unwrap();
        let order: Vec<_> = plan.files().map(SourceFile::display_name).collect();
        assert_eq!(order, vec!["pkg.vhd", "comp.vhd"]);
    }

    #[test]
    fn test_depends_on_hint_orders_libraries() {
        let mut catalog = Catalog::new("/p");
        catalog
            .register("top.v", "top", SourceAttributes::new().depends_on("ip"))
            .unwrap();
        catalog.register("ip.v", "ip", SourceAttributes::new()).unwrap();

        let plan = resolve_with_facts(&catalog, &HashMap::new()).unwrap();
        assert_eq!(plan.libraries(), vec!["ip", "top"]);
    }

    #[test]
    fn test_unknown_required_library_ignored() {
        let mut catalog = Catalog::new("/p");
        catalog.register("a.vhd", "a", SourceAttributes::new()).unwrap();
        let facts = HashMap::from([(PathBuf::from("/p/a.vhd"), facts_using("unisim", "vcomponents"))]);

        let plan = resolve_with_facts(&catalog, &facts).unwrap();
        assert_eq!(plan.libraries(), vec!["a"]);
    }

    #[test]
    fn test_intra_library_cycle_falls_back_to_declaration_order() {
        let mut catalog = Catalog::new("/p");
        catalog.register("x.vhd", "l", SourceAttributes::new()).unwrap();
        catalog.register("y.vhd", "l", SourceAttributes::new()).unwrap();

        let mut x = facts_providing("px");
        x.uses.insert(UnitRef { library: Some("work".into()), unit: "py".into() });
        let mut y = facts_providing("py");
        y.uses.insert(UnitRef { library: Some("work".into()), unit: "px".into() });
        let facts = HashMap::from([(PathBuf::from("/p/x.vhd"), x), (PathBuf::from("/p/y.vhd"), y)]);

        let plan = resolve_with_facts(&catalog, &facts).unwrap();
        let order: Vec<_> = plan.files().map(SourceFile::display_name).collect();
        assert_eq!(order, vec!["x.vhd", "y.vhd"]);
    }

    #[test]
    fn test_empty_catalog_gives_empty_plan() {
        let plan = resolve_with_facts(&Catalog::new("/p"), &HashMap::new()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.units().is_empty());
    }

    mod properties {
        use super::*;
        use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
        use crate::test_utils::generators::{dag_edges, permutation};
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

            /// Providers always precede consumers, whatever the insertion order
            #[test]
            fn test_sort_respects_every_edge(
                (edges, order) in (2usize..8).prop_flat_map(|n| (dag_edges(n), permutation(n)))
            ) {
                let mut graph = DependencyGraph::new();
                for i in &order {
                    graph.add_node(&format!("lib{i}"));
                }
                for (consumer, provider) in &edges {
                    graph.add_dependency(&format!("lib{consumer}"), &format!("lib{provider}"));
                }

                let sorted = graph.topological_sort().unwrap();
                prop_assert_eq!(sorted.len(), order.len());
                let position = |name: String| sorted.iter().position(|s| *s == name).unwrap();
                for (consumer, provider) in edges {
                    let provider_pos = position(format!("lib{provider}"));
                    let consumer_pos = position(format!("lib{consumer}"));
                    prop_assert!(provider_pos < consumer_pos);
                }
            }

            /// Closing any path back on itself is reported as a cycle
            #[test]
            fn test_back_edge_creates_cycle(n in 2usize..8) {
                let mut graph = DependencyGraph::new();
                for i in 1..n {
                    graph.add_dependency(&format!("lib{i}"), &format!("lib{}", i - 1));
                }
                prop_assert!(!graph.has_cycle());
                graph.add_dependency("lib0", &format!("lib{}", n - 1));
                let is_cycle = matches!(
                    graph.topological_sort(),
                    Err(ResolverError::CyclicDependency { ref libraries }) if libraries.len() == n
                );
                prop_assert!(is_cycle);
            }
        }
    }
}
