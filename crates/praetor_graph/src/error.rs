//! Graph run errors.

use core::fmt;
use core::time::Duration;

use praetor_policy::PolicyError;

use crate::invoker::NodeFailure;
use crate::run::GraphRun;
use crate::validate::GraphValidationError;

/// Errors that abort a graph run.
///
/// Failures after dispatch carry the partial [`GraphRun`] so callers can see
/// which nodes completed.
#[derive(Debug)]
pub enum GraphError {
    /// The graph is not a well-formed DAG. Nothing ran.
    Validation(Vec<GraphValidationError>),
    /// The graph input violates `input_schema`. Nothing ran.
    InputValidation(PolicyError),
    /// Every node succeeded but the result violates `output_schema`.
    OutputValidation {
        /// The schema error.
        error: PolicyError,
        /// The run report.
        run: Box<GraphRun>,
    },
    /// A node failed; no later wave was dispatched.
    NodeFailed {
        /// The first failing node in its wave's declared order.
        node: String,
        /// Why it failed.
        failure: NodeFailure,
        /// Nodes that had completed successfully.
        completed: Vec<String>,
        /// The run report.
        run: Box<GraphRun>,
    },
    /// The run deadline passed. In-flight calls are abandoned.
    TimedOut {
        /// Time spent before the run was abandoned.
        elapsed: Duration,
        /// Nodes that had completed successfully.
        completed: Vec<String>,
        /// The run report.
        run: Box<GraphRun>,
    },
}

impl GraphError {
    /// The run report, when any node was dispatched.
    #[must_use]
    pub fn run(&self) -> Option<&GraphRun> {
        match self {
            GraphError::Validation(_) | GraphError::InputValidation(_) => None,
            GraphError::OutputValidation { run, .. }
            | GraphError::NodeFailed { run, .. }
            | GraphError::TimedOut { run, .. } => Some(run),
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Validation(errors) => {
                write!(f, "invalid graph: ")?;
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
            GraphError::InputValidation(err) => write!(f, "graph input rejected: {err}"),
            GraphError::OutputValidation { error, .. } => {
                write!(f, "graph output rejected: {error}")
            }
            GraphError::NodeFailed { node, failure, .. } => {
                write!(f, "node {node} failed: {failure}")
            }
            GraphError::TimedOut {
                elapsed, completed, ..
            } => write!(
                f,
                "graph timed out after {:?} ({} nodes completed)",
                elapsed,
                completed.len()
            ),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::InputValidation(err) | GraphError::OutputValidation { error: err, .. } => {
                Some(err)
            }
            GraphError::NodeFailed { failure, .. } => Some(failure),
            GraphError::Validation(_) | GraphError::TimedOut { .. } => None,
        }
    }
}
