//! Per-run execution reports.

use core::time::Duration;

use serde::Serialize;

/// Final state of one dispatched node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum NodeStatus {
    /// The node returned an output.
    Succeeded,
    /// The node failed with the given message.
    Failed(String),
}

/// Timing of one dispatched node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    /// The function id.
    pub node: String,
    /// Index of the wave it ran in.
    pub wave: usize,
    /// Offset from the start of the run at which it was dispatched.
    pub started_after: Duration,
    /// How long the call took.
    pub duration: Duration,
    /// Outcome.
    pub status: NodeStatus,
}

/// What happened during one graph run.
///
/// Nodes that were never dispatched do not appear in [`GraphRun::nodes`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphRun {
    /// The graph uri.
    pub graph: String,
    /// Waves that were dispatched, in order.
    pub waves: Vec<Vec<String>>,
    /// Finished nodes, in completion order within each wave.
    pub nodes: Vec<NodeRecord>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

impl GraphRun {
    pub(crate) fn new(graph: String) -> Self {
        Self {
            graph,
            ..Self::default()
        }
    }

    /// Ids of nodes that completed successfully.
    #[must_use]
    pub fn completed(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|record| record.status == NodeStatus::Succeeded)
            .map(|record| record.node.clone())
            .collect()
    }

    /// Record of `node`, if it was dispatched and finished.
    #[must_use]
    pub fn node(&self, node: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|record| record.node == node)
    }

    /// Whether `node` was dispatched and finished, successfully or not.
    #[must_use]
    pub fn was_invoked(&self, node: &str) -> bool {
        self.node(node).is_some()
    }
}
