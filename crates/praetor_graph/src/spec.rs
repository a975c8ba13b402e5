//! The graph record.

use std::collections::BTreeMap;

use praetor_policy::{PolicyError, VersionedUri};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a graph, `{graph_name}:{graph_version}-{graph_release_tag}`.
pub type GraphUri = VersionedUri;

/// A static DAG over deployed function ids.
///
/// `connection_data` maps a node to its direct successors. It must describe a
/// DAG over `function_ids`; [`validate_graph`](crate::validate_graph) checks
/// this before anything runs.
///
/// ```
/// use praetor_graph::GraphSpec;
///
/// let graph = GraphSpec::new("ip-check", "1", "stable")
///     .unwrap()
///     .with_nodes(["funcA", "funcB", "funcC", "funcD"])
///     .with_edge("funcA", "funcB")
///     .with_edge("funcA", "funcC")
///     .with_edge("funcB", "funcD")
///     .with_edge("funcC", "funcD");
///
/// assert_eq!(graph.uri().to_string(), "ip-check:1-stable");
/// assert_eq!(graph.successors("funcA"), ["funcB", "funcC"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    uri: GraphUri,
    /// Node set, in declaration order.
    pub function_ids: Vec<String>,
    /// Adjacency list: node id to its ordered successors.
    #[serde(default)]
    pub connection_data: BTreeMap<String, Vec<String>>,
    /// Contract at the source node(s).
    #[serde(default)]
    pub input_schema: Value,
    /// Contract of the graph's result.
    #[serde(default)]
    pub output_schema: Value,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl GraphSpec {
    /// Creates an empty graph.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidUri`] if the identifier parts are invalid.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release_tag: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            uri: GraphUri::new(name, version, release_tag)?,
            function_ids: Vec::new(),
            connection_data: BTreeMap::new(),
            input_schema: Value::Null,
            output_schema: Value::Null,
            description: String::new(),
        })
    }

    /// The derived `graph_uri`.
    #[must_use]
    pub fn uri(&self) -> &GraphUri {
        &self.uri
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, function_id: impl Into<String>) -> Self {
        self.function_ids.push(function_id.into());
        self
    }

    /// Adds several nodes.
    #[must_use]
    pub fn with_nodes<S: Into<String>>(mut self, function_ids: impl IntoIterator<Item = S>) -> Self {
        self.function_ids
            .extend(function_ids.into_iter().map(Into::into));
        self
    }

    /// Adds an edge. Nodes are not added implicitly.
    #[must_use]
    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.connection_data
            .entry(from.into())
            .or_default()
            .push(to.into());
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Sets the output schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }

    /// Direct successors of a node.
    #[must_use]
    pub fn successors(&self, function_id: &str) -> &[String] {
        self.connection_data
            .get(function_id)
            .map_or(&[], Vec::as_slice)
    }
}
