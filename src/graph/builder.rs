//! Assembles declarations into a validated dependency graph.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::dag::Graph;
use crate::error::{DeclarationError, GraphError, Result};
use crate::resource::{Deployment, ResourceNode, SchemaRegistry};

/// Builds [`Graph`]s from authored declarations.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    /// Optional schema registry nodes are checked against.
    registry: Option<SchemaRegistry>,
}

/// Visit state used by cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

impl GraphBuilder {
    /// Creates a builder without schema validation.
    #[must_use]
    pub const fn new() -> Self {
        Self { registry: None }
    }

    /// Validates every node against `registry` before building edges.
    #[must_use]
    pub fn with_schema(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the graph of a deployment.
    ///
    /// # Errors
    ///
    /// Returns a declaration error for duplicate or malformed names and schema
    /// violations, an unknown-reference error when a reference, explicit
    /// dependency or output targets an undeclared node, and a cycle error when
    /// the dependencies are cyclic.
    pub fn build(&self, deployment: &Deployment) -> Result<Graph> {
        let graph = self.build_nodes(deployment.nodes.clone())?;

        for output in &deployment.outputs {
            if !graph.contains(&output.value.node) {
                return Err(GraphError::UnknownReference {
                    from: format!("output {}", output.name),
                    target: output.value.node.clone(),
                }
                .into());
            }
        }

        Ok(graph.with_outputs(deployment.outputs.clone()))
    }

    /// Builds a graph from bare nodes, without outputs.
    ///
    /// # Errors
    ///
    /// See [`GraphBuilder::build`].
    pub fn build_nodes(&self, nodes: Vec<ResourceNode>) -> Result<Graph> {
        let mut seen = HashSet::new();
        for node in &nodes {
            validate_logical_name(&node.logical_name)?;
            if !seen.insert(node.logical_name.as_str()) {
                return Err(DeclarationError::DuplicateName {
                    name: node.logical_name.clone(),
                }
                .into());
            }
        }

        if let Some(registry) = &self.registry {
            for node in &nodes {
                registry.validate(node)?;
            }
        }

        let index = Self::index(&nodes);
        for node in &nodes {
            for target in node.dependency_names() {
                if !index.contains_key(target) {
                    return Err(GraphError::UnknownReference {
                        from: node.logical_name.clone(),
                        target: target.to_string(),
                    }
                    .into());
                }
            }
        }

        let edges = Self::edges(&nodes, &index);
        if let Some(cycle) = find_cycle(&edges) {
            let cycle = cycle
                .into_iter()
                .map(|i| nodes[i].logical_name.clone())
                .collect();
            return Err(GraphError::Cycle { cycle }.into());
        }

        debug!(
            "Built dependency graph with {} nodes and {} edges",
            nodes.len(),
            edges.iter().map(BTreeSet::len).sum::<usize>()
        );

        Ok(Graph::from_parts(nodes, edges, Vec::new()))
    }

    fn index(nodes: &[ResourceNode]) -> HashMap<&str, usize> {
        nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.logical_name.as_str(), i))
            .collect()
    }

    fn edges(nodes: &[ResourceNode], index: &HashMap<&str, usize>) -> Vec<BTreeSet<usize>> {
        nodes
            .iter()
            .map(|node| {
                node.dependency_names()
                    .into_iter()
                    .filter_map(|name| index.get(name).copied())
                    .collect()
            })
            .collect()
    }
}

/// Checks that a logical name starts with a lowercase letter and contains
/// only lowercase letters, digits, `_` and `-`.
///
/// # Errors
///
/// Returns [`DeclarationError::InvalidName`] describing the first problem.
pub fn validate_logical_name(name: &str) -> std::result::Result<(), DeclarationError> {
    let invalid = |reason: &str| DeclarationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("name is empty"));
    };
    if !first.is_ascii_lowercase() {
        return Err(invalid("must start with a lowercase letter"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
    {
        return Err(invalid(&format!("invalid character '{c}'")));
    }

    Ok(())
}

/// Finds a cycle with DFS colouring, using an explicit stack.
///
/// Returns the node indices along the cycle with the first repeated at the end.
fn find_cycle(edges: &[BTreeSet<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::White; edges.len()];

    for start in 0..edges.len() {
        if marks[start] != Mark::White {
            continue;
        }
        marks[start] = Mark::Gray;
        let mut stack = vec![(start, edges[start].iter())];

        while let Some((node, children)) = stack.last_mut() {
            let node = *node;
            let Some(&next) = children.next() else {
                marks[node] = Mark::Black;
                stack.pop();
                continue;
            };

            match marks[next] {
                Mark::Gray => {
                    let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[from..].iter().map(|(n, _)| *n).collect();
                    cycle.push(next);
                    return Some(cycle);
                }
                Mark::White => {
                    marks[next] = Mark::Gray;
                    stack.push((next, edges[next].iter()));
                }
                Mark::Black => {}
            }
        }
    }

    None
}
