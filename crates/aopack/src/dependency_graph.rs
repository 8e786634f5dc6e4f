//! Require edges between local modules
//!
//! The graph builder produces its load order directly from the DFS. This
//! petgraph view of the same edges answers the questions the DFS order cannot:
//! which modules form cycles, and whether a given order respects every edge.
//!
//! Edges point from the requiring module to the required one, so outgoing
//! neighbors are dependencies.

use std::path::{Path, PathBuf};

use petgraph::{
    Direction,
    algo::{is_cyclic_directed, tarjan_scc},
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::FxHashMap;

use crate::graph_builder::ModuleNode;

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<PathBuf, ()>,
    node_indices: FxHashMap<PathBuf, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph over `modules`; edges to modules outside the slice are dropped
    pub fn from_modules(modules: &[ModuleNode]) -> Self {
        let mut graph = Self::default();
        for module in modules {
            graph.add_module(&module.resolved_path);
        }
        for module in modules {
            for dependency in &module.dependencies {
                graph.add_dependency(&module.resolved_path, dependency);
            }
        }
        graph
    }

    fn add_module(&mut self, path: &Path) -> NodeIndex {
        if let Some(&index) = self.node_indices.get(path) {
            return index;
        }
        let index = self.graph.add_node(path.to_path_buf());
        self.node_indices.insert(path.to_path_buf(), index);
        index
    }

    /// Record that `from` requires `to`; unknown endpoints are ignored
    fn add_dependency(&mut self, from: &Path, to: &Path) {
        if let (Some(&from_idx), Some(&to_idx)) =
            (self.node_indices.get(from), self.node_indices.get(to))
            && !self.graph.contains_edge(from_idx, to_idx)
        {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Modules required directly by `path`, in module order
    pub fn dependencies(&self, path: &Path) -> Vec<&Path> {
        let Some(&index) = self.node_indices.get(path) else {
            return Vec::new();
        };
        let mut neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        neighbors.sort_unstable();
        neighbors
            .into_iter()
            .map(|idx| self.graph[idx].as_path())
            .collect()
    }

    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Strongly connected components that form a cycle
    ///
    /// Members of each cycle are listed in module insertion order so the
    /// report is stable between runs.
    pub fn find_cycles(&self) -> Vec<Vec<PathBuf>> {
        let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&idx| self.graph.contains_edge(idx, idx))
            })
            .map(|mut component| {
                component.sort_unstable();
                component
            })
            .collect();
        cycles.sort_unstable();

        cycles
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect()
            })
            .collect()
    }

    /// Edges `(dependent, dependency)` whose dependency does not come first in `order`
    ///
    /// Empty for every order produced from an acyclic graph.
    pub fn ordering_violations(&self, order: &[PathBuf]) -> Vec<(PathBuf, PathBuf)> {
        let position: FxHashMap<&Path, usize> = order
            .iter()
            .enumerate()
            .map(|(i, path)| (path.as_path(), i))
            .collect();

        let mut violations = Vec::new();
        for edge in self.graph.raw_edges() {
            let dependent = &self.graph[edge.source()];
            let dependency = &self.graph[edge.target()];
            if let (Some(&dependent_pos), Some(&dependency_pos)) = (
                position.get(dependent.as_path()),
                position.get(dependency.as_path()),
            ) && dependency_pos >= dependent_pos
            {
                violations.push((dependent.clone(), dependency.clone()));
            }
        }
        violations
    }
}
