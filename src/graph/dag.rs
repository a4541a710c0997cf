//! The validated dependency graph of one deployment.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::resource::{OutputDecl, ResourceNode};

/// Directed acyclic dependency graph over declared resources.
///
/// Built once per planning cycle by [`super::GraphBuilder`]; every edge
/// resolves to a declared node and the graph contains no cycle.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Nodes in declaration order.
    nodes: Vec<ResourceNode>,
    /// Logical name to position in `nodes`.
    index: HashMap<String, usize>,
    /// For each node, the nodes it depends on.
    dependencies: Vec<BTreeSet<usize>>,
    /// For each node, the nodes depending on it.
    dependents: Vec<BTreeSet<usize>>,
    /// Exported outputs.
    outputs: Vec<OutputDecl>,
}

impl Graph {
    /// Assembles a graph from nodes and precomputed dependency edges.
    ///
    /// Callers must guarantee that edges are in range and acyclic.
    pub(crate) fn from_parts(
        nodes: Vec<ResourceNode>,
        dependencies: Vec<BTreeSet<usize>>,
        outputs: Vec<OutputDecl>,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.logical_name.clone(), i))
            .collect();

        let mut dependents = vec![BTreeSet::new(); nodes.len()];
        for (node, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].insert(node);
            }
        }

        Self {
            nodes,
            index,
            dependencies,
            dependents,
            outputs,
        }
    }

    /// Attaches exported outputs.
    pub(crate) fn with_outputs(mut self, outputs: Vec<OutputDecl>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Returns the nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Returns the exported outputs.
    #[must_use]
    pub fn outputs(&self) -> &[OutputDecl] {
        &self.outputs
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by logical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Returns the declaration position of a node.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns true if a node with this name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns the direct dependencies of a node, in declaration order.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.dependencies)
    }

    /// Returns the direct dependents of a node, in declaration order.
    #[must_use]
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.dependents)
    }

    /// Returns every transitive dependent of a node, in declaration order.
    #[must_use]
    pub fn descendants(&self, name: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(name) else {
            return Vec::new();
        };

        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = self.dependents[start].iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            if seen.insert(i) {
                queue.extend(self.dependents[i].iter().copied());
            }
        }

        seen.into_iter()
            .map(|i| self.nodes[i].logical_name.as_str())
            .collect()
    }

    /// Returns the nodes ordered so each follows all of its dependencies.
    ///
    /// Uses Kahn's algorithm; among ready nodes the earliest declared wins.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&ResourceNode> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, d)| *d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_first() {
            order.push(&self.nodes[i]);
            for &dependent in &self.dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        order
    }

    /// Returns true if `ancestor` is reachable by following dependencies from `node`.
    #[must_use]
    pub fn depends_transitively(&self, node: &str, ancestor: &str) -> bool {
        self.descendants(ancestor).contains(&node)
    }

    fn neighbours<'a>(&'a self, name: &str, edges: &[BTreeSet<usize>]) -> Vec<&'a str> {
        self.index
            .get(name)
            .map(|&i| {
                edges[i]
                    .iter()
                    .map(|&j| self.nodes[j].logical_name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}
