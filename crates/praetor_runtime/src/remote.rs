//! Stateless remote execution.
//!
//! The calling side sends a [`RemoteEvaluate`] or [`RemoteManage`] through a
//! [`RemoteTransport`]; the executor side answers with a
//! [`StatelessExecutorService`], which constructs a fresh instance for every
//! call and drops it afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use praetor_executors::PolicyExecutor;
use praetor_policy::{ExecutionMode, Overrides, PolicyLoader, PolicyRuleUri};
use praetor_system::resource::GlobalResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{DispatchError, ErrorReport};
use crate::mode::ensure_mode;

/// Body of an evaluate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvaluate {
    /// The rule to evaluate.
    pub policy_rule_uri: PolicyRuleUri,
    /// Evaluation input.
    pub input: Value,
    /// Settings and parameters overrides.
    #[serde(default)]
    pub overrides: Overrides,
}

/// Body of a manage call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteManage {
    /// The rule to manage.
    pub policy_rule_uri: PolicyRuleUri,
    /// Management action.
    pub action: String,
    /// Action payload.
    pub data: Value,
    /// Settings and parameters overrides.
    #[serde(default)]
    pub overrides: Overrides,
}

/// Reply to either call: `{"output": ..}` or `{"error": {"kind", "detail"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteReply {
    /// The call succeeded.
    Output(Value),
    /// The call failed on the executor.
    Error(ErrorReport),
}

impl RemoteReply {
    /// Wraps a local result for the wire.
    #[must_use]
    pub fn from_result(result: Result<Value, DispatchError>) -> Self {
        match result {
            Ok(output) => Self::Output(output),
            Err(err) => Self::Error(err.report()),
        }
    }

    /// Unwraps a reply received from the wire.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Remote`] carrying the executor's report.
    pub fn into_result(self) -> Result<Value, DispatchError> {
        match self {
            Self::Output(output) => Ok(output),
            Self::Error(report) => Err(DispatchError::Remote(report)),
        }
    }
}

/// Carries calls to a remote executor.
#[async_trait]
pub trait RemoteTransport: Send + Sync + 'static {
    /// Evaluates a rule on `executor`.
    async fn evaluate(
        &self,
        executor: &PolicyExecutor,
        request: &RemoteEvaluate,
    ) -> Result<Value, DispatchError>;

    /// Runs a management command on `executor`.
    async fn manage(
        &self,
        executor: &PolicyExecutor,
        request: &RemoteManage,
    ) -> Result<Value, DispatchError>;
}

/// The executor side of stateless remote execution.
///
/// Every call loads a fresh instance that is never cached, so no context
/// crosses calls even though compiled schemas are reused.
#[derive(Debug)]
pub struct StatelessExecutorService {
    loader: Arc<PolicyLoader>,
}

impl GlobalResource for StatelessExecutorService {}

impl StatelessExecutorService {
    /// Creates a service over `loader`.
    #[must_use]
    pub fn new(loader: Arc<PolicyLoader>) -> Self {
        Self { loader }
    }

    /// Evaluates once on a fresh instance.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::StatefulNotSupported`] for stateful rules and
    /// any load or evaluation error.
    pub async fn evaluate(&self, request: &RemoteEvaluate) -> Result<Value, DispatchError> {
        let uri = &request.policy_rule_uri;
        let rule = self.loader.rule(uri).await?;
        ensure_mode(&rule, ExecutionMode::Remote)?;
        let instance = self
            .loader
            .load_fresh(uri, ExecutionMode::Remote, &request.overrides, None)
            .await?;
        let output = instance.evaluate(request.input.clone()).await?;
        debug!(policy_rule_uri = %uri, "stateless evaluation finished");
        Ok(output)
    }

    /// Runs a management command on a fresh instance.
    ///
    /// The command is validated and executed, but its effect ends with the
    /// call.
    ///
    /// # Errors
    ///
    /// Same as [`evaluate`](Self::evaluate), plus unknown actions.
    pub async fn manage(&self, request: &RemoteManage) -> Result<Value, DispatchError> {
        let uri = &request.policy_rule_uri;
        let rule = self.loader.rule(uri).await?;
        ensure_mode(&rule, ExecutionMode::Remote)?;
        let instance = self
            .loader
            .load_fresh(uri, ExecutionMode::Remote, &request.overrides, None)
            .await?;
        Ok(instance.manage(&request.action, request.data.clone()).await?)
    }

    /// [`evaluate`](Self::evaluate) in wire form.
    pub async fn handle_evaluate(&self, request: &RemoteEvaluate) -> RemoteReply {
        RemoteReply::from_result(self.evaluate(request).await)
    }

    /// [`manage`](Self::manage) in wire form.
    pub async fn handle_manage(&self, request: &RemoteManage) -> RemoteReply {
        RemoteReply::from_result(self.manage(request).await)
    }
}

/// A transport that serves every executor from an in-process service.
///
/// Requests and replies pass through JSON so the wire contract is exercised.
/// Useful for single-process deployments and tests.
#[derive(Debug)]
pub struct LoopbackTransport {
    service: Arc<StatelessExecutorService>,
    calls: Mutex<Vec<String>>,
}

impl LoopbackTransport {
    /// Routes every executor to `service`.
    #[must_use]
    pub fn new(service: Arc<StatelessExecutorService>) -> Self {
        Self {
            service,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Executor ids called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn over_wire<T: Serialize + for<'de> Deserialize<'de>>(
        executor: &PolicyExecutor,
        body: &T,
    ) -> Result<T, DispatchError> {
        serde_json::to_value(body)
            .and_then(serde_json::from_value)
            .map_err(|err| DispatchError::unavailable(&executor.executor_id, err.to_string()))
    }
}

#[async_trait]
impl RemoteTransport for LoopbackTransport {
    async fn evaluate(
        &self,
        executor: &PolicyExecutor,
        request: &RemoteEvaluate,
    ) -> Result<Value, DispatchError> {
        self.calls.lock().push(executor.executor_id.clone());
        let request = Self::over_wire(executor, request)?;
        let reply = self.service.handle_evaluate(&request).await;
        Self::over_wire(executor, &reply)?.into_result()
    }

    async fn manage(
        &self,
        executor: &PolicyExecutor,
        request: &RemoteManage,
    ) -> Result<Value, DispatchError> {
        self.calls.lock().push(executor.executor_id.clone());
        let request = Self::over_wire(executor, request)?;
        let reply = self.service.handle_manage(&request).await;
        Self::over_wire(executor, &reply)?.into_result()
    }
}
