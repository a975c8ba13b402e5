//! Structural validation and wave layering.
//!
//! A graph is checked before any node runs. Problems are collected rather than
//! reported one at a time, so a malformed graph shows everything wrong with it.

use core::fmt;
use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};

use crate::spec::GraphSpec;

/// A structural problem in a [`GraphSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphValidationError {
    /// The graph declares no nodes.
    Empty,
    /// A node id is declared twice.
    DuplicateNode(String),
    /// An edge references a node that is not declared.
    UnknownNode {
        /// The undeclared id.
        node: String,
        /// The edge that references it.
        edge: (String, String),
    },
    /// The same edge appears twice.
    DuplicateEdge {
        /// Edge source.
        from: String,
        /// Edge target.
        to: String,
    },
    /// The edges do not form a DAG.
    Cycle {
        /// Nodes that could not be ordered.
        nodes: Vec<String>,
    },
    /// The input or output schema does not compile.
    InvalidSchema {
        /// `input` or `output`.
        boundary: &'static str,
        /// Compiler message.
        message: String,
    },
}

impl fmt::Display for GraphValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphValidationError::Empty => write!(f, "graph has no nodes"),
            GraphValidationError::DuplicateNode(id) => write!(f, "duplicate node: {id}"),
            GraphValidationError::UnknownNode { node, edge } => {
                write!(f, "edge {} -> {} references unknown node: {node}", edge.0, edge.1)
            }
            GraphValidationError::DuplicateEdge { from, to } => {
                write!(f, "duplicate edge: {from} -> {to}")
            }
            GraphValidationError::Cycle { nodes } => {
                write!(f, "cycle through: {}", nodes.join(", "))
            }
            GraphValidationError::InvalidSchema { boundary, message } => {
                write!(f, "invalid {boundary} schema: {message}")
            }
        }
    }
}

impl std::error::Error for GraphValidationError {}

/// A graph proven to be a DAG, with its schedule precomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedGraph {
    /// A topological order of every node.
    pub order: Vec<String>,
    /// Nodes grouped by the earliest wave in which they can run.
    ///
    /// Every predecessor of a node in wave `k` lies in a wave before `k`.
    pub waves: Vec<Vec<String>>,
    /// Direct predecessors of each node, in declaration order.
    pub predecessors: BTreeMap<String, Vec<String>>,
    /// Nodes without predecessors; they receive the graph input.
    pub sources: Vec<String>,
    /// Nodes without successors; they produce the graph output.
    pub sinks: Vec<String>,
}

impl ValidatedGraph {
    /// Direct predecessors of `node`.
    #[must_use]
    pub fn predecessors_of(&self, node: &str) -> &[String] {
        self.predecessors.get(node).map_or(&[], Vec::as_slice)
    }
}

/// Checks that `spec` is a DAG over its declared nodes and layers it into waves.
///
/// # Errors
///
/// Returns every structural problem found. Cycle detection only runs once the
/// node and edge sets are well formed.
pub fn validate_graph(spec: &GraphSpec) -> Result<ValidatedGraph, Vec<GraphValidationError>> {
    if spec.function_ids.is_empty() {
        return Err(vec![GraphValidationError::Empty]);
    }

    let mut errors = Vec::new();

    let mut position: HashMap<&str, usize> = HashMap::with_capacity(spec.function_ids.len());
    for (index, id) in spec.function_ids.iter().enumerate() {
        if position.insert(id.as_str(), index).is_some() {
            errors.push(GraphValidationError::DuplicateNode(id.clone()));
        }
    }

    let mut seen_edges: HashSet<(&str, &str)> = HashSet::new();
    let mut predecessors: BTreeMap<String, Vec<String>> = spec
        .function_ids
        .iter()
        .map(|id| (id.clone(), Vec::new()))
        .collect();

    for (from, targets) in &spec.connection_data {
        for to in targets {
            let edge = (from.clone(), to.clone());
            for end in [from, to] {
                if !position.contains_key(end.as_str()) {
                    errors.push(GraphValidationError::UnknownNode {
                        node: end.clone(),
                        edge: edge.clone(),
                    });
                }
            }
            if !seen_edges.insert((from.as_str(), to.as_str())) {
                errors.push(GraphValidationError::DuplicateEdge {
                    from: from.clone(),
                    to: to.clone(),
                });
            } else if let Some(parents) = predecessors.get_mut(to) {
                parents.push(from.clone());
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let declared = |id: &String| position.get(id.as_str()).copied().unwrap_or(usize::MAX);
    for parents in predecessors.values_mut() {
        parents.sort_by_key(declared);
    }

    // Layered Kahn: each wave is every node whose in-degree drops to zero
    // once the previous wave is removed.
    let mut in_degree: HashMap<String, usize> = predecessors
        .iter()
        .map(|(id, parents)| (id.clone(), parents.len()))
        .collect();

    let mut current: Vec<String> = spec
        .function_ids
        .iter()
        .filter(|id| in_degree.get(id.as_str()) == Some(&0))
        .cloned()
        .collect();

    let sources = current.clone();
    let mut waves = Vec::new();
    let mut order = Vec::with_capacity(spec.function_ids.len());

    while !current.is_empty() {
        let mut next = Vec::new();
        for id in &current {
            for child in spec.successors(id) {
                if let Some(degree) = in_degree.get_mut(child.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(child.clone());
                    }
                }
            }
        }
        next.sort_by_key(declared);
        order.extend(current.iter().cloned());
        waves.push(current);
        current = next;
    }

    if order.len() < spec.function_ids.len() {
        let nodes = spec
            .function_ids
            .iter()
            .filter(|id| in_degree.get(id.as_str()).is_some_and(|d| *d > 0))
            .cloned()
            .collect();
        return Err(vec![GraphValidationError::Cycle { nodes }]);
    }

    let sinks = spec
        .function_ids
        .iter()
        .filter(|id| spec.successors(id).is_empty())
        .cloned()
        .collect();

    Ok(ValidatedGraph {
        order,
        waves,
        predecessors,
        sources,
        sinks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> GraphSpec {
        GraphSpec::new("diamond", "1", "stable")
            .unwrap()
            .with_nodes(["a", "b", "c", "d"])
            .with_edge("a", "b")
            .with_edge("a", "c")
            .with_edge("b", "d")
            .with_edge("c", "d")
    }

    #[test]
    fn diamond_layers_into_three_waves() {
        let graph = validate_graph(&diamond()).unwrap();
        assert_eq!(graph.waves, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
        assert_eq!(graph.sources, ["a"]);
        assert_eq!(graph.sinks, ["d"]);
        assert_eq!(graph.predecessors_of("d"), ["b", "c"]);
    }

    #[test]
    fn node_waits_for_longest_path() {
        // a -> b -> c, a -> c: c must wait for b.
        let spec = GraphSpec::new("chain", "1", "stable")
            .unwrap()
            .with_nodes(["a", "b", "c"])
            .with_edge("a", "c")
            .with_edge("a", "b")
            .with_edge("b", "c");
        let graph = validate_graph(&spec).unwrap();
        assert_eq!(graph.waves, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn empty_graph_is_rejected() {
        let spec = GraphSpec::new("empty", "1", "stable").unwrap();
        assert_eq!(validate_graph(&spec), Err(vec![GraphValidationError::Empty]));
    }

    #[test]
    fn cycle_is_reported_with_its_nodes() {
        let spec = GraphSpec::new("loop", "1", "stable")
            .unwrap()
            .with_nodes(["a", "b", "c"])
            .with_edge("a", "b")
            .with_edge("b", "c")
            .with_edge("c", "b");
        let errors = validate_graph(&spec).unwrap_err();
        assert_eq!(
            errors,
            vec![GraphValidationError::Cycle {
                nodes: vec!["b".into(), "c".into()]
            }]
        );
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let spec = GraphSpec::new("self", "1", "stable")
            .unwrap()
            .with_node("a")
            .with_edge("a", "a");
        assert!(matches!(
            validate_graph(&spec).unwrap_err().as_slice(),
            [GraphValidationError::Cycle { .. }]
        ));
    }

    #[test]
    fn structural_errors_are_collected() {
        let spec = GraphSpec::new("broken", "1", "stable")
            .unwrap()
            .with_nodes(["a", "a", "b"])
            .with_edge("a", "ghost")
            .with_edge("a", "b")
            .with_edge("a", "b");
        let errors = validate_graph(&spec).unwrap_err();
        assert!(errors.contains(&GraphValidationError::DuplicateNode("a".into())));
        assert!(errors.contains(&GraphValidationError::DuplicateEdge {
            from: "a".into(),
            to: "b".into()
        }));
        assert!(errors.iter().any(|e| matches!(
            e,
            GraphValidationError::UnknownNode { node, .. } if node == "ghost"
        )));
    }
}
