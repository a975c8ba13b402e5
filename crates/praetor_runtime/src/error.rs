//! The uniform error surface of every execution mode.

use core::fmt;

use praetor_executors::RegistryError;
use praetor_graph::{GraphError, NodeFailure};
use praetor_policy::{ExecutionMode, PolicyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a [`DispatchError`], stable across modes and the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A payload, schema, or request shape was rejected.
    Validation,
    /// Unknown rule, executor, function, graph, or job.
    NotFound,
    /// The code bundle could not be fetched or resolved.
    CodeResolution,
    /// Dynamic executor allocation failed.
    Allocation,
    /// A graph is not a well-formed DAG.
    GraphValidation,
    /// The policy's own logic failed.
    Execution,
    /// An executor, function, or job runner could not be reached in time.
    Unavailable,
    /// Stateful semantics were requested over a stateless mode.
    StatefulNotSupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::CodeResolution => "code_resolution",
            Self::Allocation => "allocation",
            Self::GraphValidation => "graph_validation",
            Self::Execution => "execution",
            Self::Unavailable => "unavailable",
            Self::StatefulNotSupported => "stateful_not_supported",
        })
    }
}

/// Serializable form of a [`DispatchError`]: a kind and a readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// The error category.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub detail: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Errors returned by the dispatcher and its managers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Loading, evaluating, or managing a policy instance failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Executor resolution failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A graph run failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The rule keeps state across calls but the mode evicts after one call.
    #[error("rule {uri} is stateful (type {execution_type}) and cannot run in {mode} mode")]
    StatefulNotSupported {
        /// The rule.
        uri: String,
        /// The requested mode.
        mode: ExecutionMode,
        /// Its declared type code.
        execution_type: u8,
    },

    /// No function, graph, or job is known under the id.
    #[error("{what} not found: {id}")]
    NotFound {
        /// `function`, `graph`, or `job`.
        what: &'static str,
        /// The requested id.
        id: String,
    },

    /// A remote executor, function, or job runner could not be reached.
    #[error("{target} unavailable: {reason}")]
    Unavailable {
        /// What was being called.
        target: String,
        /// Why the call did not complete.
        reason: String,
    },

    /// A remote executor reported an error.
    #[error("remote executor failed with {0}")]
    Remote(ErrorReport),

    /// The request itself is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DispatchError {
    /// Creates an [`Unavailable`](Self::Unavailable) error.
    pub fn unavailable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`NotFound`](Self::NotFound) error.
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Creates an [`InvalidRequest`](Self::InvalidRequest) error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Policy(err) => policy_kind(err),
            Self::Registry(err) => match err {
                RegistryError::NotFound(_) | RegistryError::NotHealthy { .. } => ErrorKind::NotFound,
                RegistryError::Allocation(_) | RegistryError::Allocator(_) => ErrorKind::Allocation,
                RegistryError::AlreadyRegistered(_) => ErrorKind::Validation,
            },
            Self::Graph(err) => match err {
                GraphError::Validation(_) => ErrorKind::GraphValidation,
                GraphError::InputValidation(_) | GraphError::OutputValidation { .. } => {
                    ErrorKind::Validation
                }
                GraphError::NodeFailed { failure, .. } => match failure {
                    NodeFailure::Execution(_) => ErrorKind::Execution,
                    NodeFailure::Validation(_) => ErrorKind::Validation,
                    NodeFailure::Unavailable(_) => ErrorKind::Unavailable,
                },
                GraphError::TimedOut { .. } => ErrorKind::Unavailable,
            },
            Self::StatefulNotSupported { .. } => ErrorKind::StatefulNotSupported,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Remote(report) => report.kind,
            Self::InvalidRequest(_) => ErrorKind::Validation,
        }
    }

    /// The serializable form of this error.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            detail: self.to_string(),
        }
    }

    /// Converts this error into the failure of one graph node.
    #[must_use]
    pub fn into_node_failure(self) -> NodeFailure {
        let detail = self.to_string();
        match self.kind() {
            ErrorKind::Validation => NodeFailure::Validation(detail),
            ErrorKind::NotFound | ErrorKind::Unavailable => NodeFailure::Unavailable(detail),
            _ => NodeFailure::Execution(detail),
        }
    }
}

fn policy_kind(err: &PolicyError) -> ErrorKind {
    match err {
        PolicyError::Validation { .. }
        | PolicyError::InvalidSchema { .. }
        | PolicyError::InvalidUri { .. }
        | PolicyError::UnknownAction { .. }
        | PolicyError::AlreadyRegistered(_) => ErrorKind::Validation,
        PolicyError::NotFound(_) => ErrorKind::NotFound,
        PolicyError::CodeResolution { .. } => ErrorKind::CodeResolution,
        PolicyError::Execution { .. } => ErrorKind::Execution,
    }
}
