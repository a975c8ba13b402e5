//! Registered graphs.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use praetor_graph::{GraphError, GraphSpec, validate_graph};
use praetor_system::resource::GlobalResource;

use crate::error::DispatchError;

/// Graphs by uri. Only well-formed DAGs are accepted.
#[derive(Debug, Default)]
pub struct GraphStore {
    graphs: RwLock<IndexMap<String, Arc<GraphSpec>>>,
}

impl GlobalResource for GraphStore {}

impl GraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a graph under its derived uri.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Validation`] (wrapped) if the graph is not a DAG
    /// - [`DispatchError::InvalidRequest`] if the uri is taken
    pub fn register(&self, spec: GraphSpec) -> Result<Arc<GraphSpec>, DispatchError> {
        validate_graph(&spec).map_err(GraphError::Validation)?;
        let uri = spec.uri().to_string();
        let mut graphs = self.graphs.write();
        if graphs.contains_key(&uri) {
            return Err(DispatchError::invalid(format!(
                "graph {uri} is already registered"
            )));
        }
        let spec = Arc::new(spec);
        graphs.insert(uri.clone(), Arc::clone(&spec));
        tracing::info!(graph_uri = %uri, nodes = spec.function_ids.len(), "graph registered");
        Ok(spec)
    }

    /// Looks a graph up.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown uri.
    pub fn get(&self, graph_uri: &str) -> Result<Arc<GraphSpec>, DispatchError> {
        self.graphs
            .read()
            .get(graph_uri)
            .cloned()
            .ok_or_else(|| DispatchError::not_found("graph", graph_uri))
    }

    /// Unregisters a graph.
    pub fn remove(&self, graph_uri: &str) -> Option<Arc<GraphSpec>> {
        self.graphs.write().shift_remove(graph_uri)
    }

    /// Every graph, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<GraphSpec>> {
        self.graphs.read().values().cloned().collect()
    }

    /// Number of registered graphs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.read().len()
    }

    /// Returns `true` if no graphs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn cyclic_graphs_are_refused() {
        let store = GraphStore::new();
        let spec = GraphSpec::new("loop", "1", "stable")
            .unwrap()
            .with_nodes(["A", "B"])
            .with_edge("A", "B")
            .with_edge("B", "A");
        let err = store.register(spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphValidation);
        assert!(store.is_empty());
    }

    #[test]
    fn lookup_by_uri() {
        let store = GraphStore::new();
        let spec = GraphSpec::new("ip-check", "1.0", "stable")
            .unwrap()
            .with_node("funcA");
        store.register(spec.clone()).unwrap();

        assert_eq!(store.get("ip-check:1.0-stable").unwrap().function_ids, ["funcA"]);
        assert_eq!(store.register(spec).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(store.get("ip-check:2.0-stable").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
