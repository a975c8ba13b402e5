//! Execution and management requests.

use core::time::Duration;

use praetor_graph::GraphOutcome;
use praetor_policy::{ExecutionMode, Overrides};
use serde_json::Value;

use crate::jobs::JobHandle;

/// One request to execute a rule, function, or graph.
///
/// `target` is a policy rule uri for `local`, `remote`, and `job` modes, a
/// function id for `function` mode, and a graph uri for `graph` mode.
///
/// ```
/// use core::time::Duration;
/// use praetor_runtime::{ExecutionMode, ExecutionRequest};
/// use serde_json::json;
///
/// let request = ExecutionRequest::remote("ip-allowlist:1.0-stable", json!({"ip": "10.0.0.1"}))
///     .with_hints(json!({"gpu": false}))
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(request.mode, ExecutionMode::Remote);
/// assert_eq!(request.executor_id, None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    /// Requested mode.
    pub mode: ExecutionMode,
    /// Rule uri, function id, or graph uri.
    pub target: String,
    /// Evaluation input.
    pub input: Value,
    /// Settings and parameters overrides for rule modes.
    pub overrides: Overrides,
    /// Explicit executor for `remote` and `job` modes; allocated when absent.
    pub executor_id: Option<String>,
    /// Hints for the resource allocator.
    pub hints: Value,
    /// Deadline for the call; the configured default applies when absent.
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    /// Creates a request in `mode` against `target`.
    pub fn new(mode: ExecutionMode, target: impl Into<String>, input: Value) -> Self {
        Self {
            mode,
            target: target.into(),
            input,
            overrides: Overrides::none(),
            executor_id: None,
            hints: Value::Null,
            timeout: None,
        }
    }

    /// Evaluates a rule in the caller's process.
    pub fn local(uri: impl Into<String>, input: Value) -> Self {
        Self::new(ExecutionMode::Local, uri, input)
    }

    /// Evaluates a rule on a remote executor.
    pub fn remote(uri: impl Into<String>, input: Value) -> Self {
        Self::new(ExecutionMode::Remote, uri, input)
    }

    /// Submits a rule as a one-shot job.
    pub fn job(uri: impl Into<String>, input: Value) -> Self {
        Self::new(ExecutionMode::Job, uri, input)
    }

    /// Invokes a deployed function.
    pub fn function(function_id: impl Into<String>, input: Value) -> Self {
        Self::new(ExecutionMode::Function, function_id, input)
    }

    /// Runs a registered graph.
    pub fn graph(graph_uri: impl Into<String>, input: Value) -> Self {
        Self::new(ExecutionMode::Graph, graph_uri, input)
    }

    /// Sets the overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Names the executor to use.
    #[must_use]
    pub fn with_executor(mut self, executor_id: impl Into<String>) -> Self {
        self.executor_id = Some(executor_id.into());
        self
    }

    /// Sets the allocator hints.
    #[must_use]
    pub fn with_hints(mut self, hints: Value) -> Self {
        self.hints = hints;
        self
    }

    /// Sets the deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What an execution produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResponse {
    /// A synchronous result from `local`, `remote`, or `function` mode.
    Output(Value),
    /// A submitted job; poll the job manager for its result.
    Job(JobHandle),
    /// A finished graph run.
    Graph(GraphOutcome),
}

impl ExecutionResponse {
    /// The synchronous output, if any.
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        match self {
            Self::Output(output) => Some(output),
            Self::Graph(outcome) => Some(&outcome.output),
            Self::Job(_) => None,
        }
    }

    /// The job handle, if this was a job submission.
    #[must_use]
    pub fn job(&self) -> Option<&JobHandle> {
        match self {
            Self::Job(handle) => Some(handle),
            _ => None,
        }
    }
}

/// A management command sent to a running instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ManageRequest {
    /// `local`, `remote`, or `function`.
    pub mode: ExecutionMode,
    /// Rule uri, or function id in `function` mode.
    pub target: String,
    /// One of the rule's declared management commands.
    pub action: String,
    /// Command payload.
    pub data: Value,
    /// Overrides identifying the instance for rule modes.
    pub overrides: Overrides,
    /// Explicit executor for `remote` mode.
    pub executor_id: Option<String>,
}

impl ManageRequest {
    /// Creates a management request.
    pub fn new(
        mode: ExecutionMode,
        target: impl Into<String>,
        action: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            mode,
            target: target.into(),
            action: action.into(),
            data,
            overrides: Overrides::none(),
            executor_id: None,
        }
    }

    /// Sets the overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Names the executor to use.
    #[must_use]
    pub fn with_executor(mut self, executor_id: impl Into<String>) -> Self {
        self.executor_id = Some(executor_id.into());
        self
    }
}
