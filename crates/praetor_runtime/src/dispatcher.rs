//! Execution mode dispatch.
//!
//! | Mode | Target | Path |
//! |------|--------|------|
//! | `local` | rule uri | cached instance in this process |
//! | `remote` | rule uri | resolve executor, call over [`RemoteTransport`] |
//! | `job` | rule uri | resolve executor, submit to [`JobManager`] |
//! | `function` | function id | [`FunctionManager`] |
//! | `graph` | graph uri | [`GraphExecutor`] over deployed functions |
//!
//! The mode is chosen by the caller; the rule's declared type only decides
//! whether the choice is valid.

use core::time::Duration;
use std::sync::Arc;

use praetor_core_plugins::RuntimeConfig;
use praetor_executors::{ExecutorRegistry, HealthProbe, PolicyExecutor, ProbeReport, ResolveOptions};
use praetor_graph::{GraphExecutor, GraphOutcome};
use praetor_policy::{ExecutionMode, PolicyLoader, PolicyRuleUri};
use praetor_system::resource::GlobalResource;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::functions::FunctionManager;
use crate::graphs::GraphStore;
use crate::jobs::{JobHandle, JobManager};
use crate::mode::ensure_mode;
use crate::remote::{RemoteEvaluate, RemoteManage, RemoteTransport};
use crate::request::{ExecutionRequest, ExecutionResponse, ManageRequest};

/// Routes requests to the mode the caller asked for.
pub struct Dispatcher {
    loader: Arc<PolicyLoader>,
    registry: Arc<ExecutorRegistry>,
    transport: Arc<dyn RemoteTransport>,
    jobs: Arc<JobManager>,
    functions: Arc<FunctionManager>,
    graphs: Arc<GraphStore>,
    graph_executor: GraphExecutor,
    remote_timeout: Duration,
    probe_window: Duration,
    accept_degraded: bool,
}

impl GlobalResource for Dispatcher {}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("graph_executor", &self.graph_executor)
            .field("remote_timeout", &self.remote_timeout)
            .field("accept_degraded", &self.accept_degraded)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the default [`RuntimeConfig`].
    #[must_use]
    pub fn new(
        loader: Arc<PolicyLoader>,
        registry: Arc<ExecutorRegistry>,
        transport: Arc<dyn RemoteTransport>,
        jobs: Arc<JobManager>,
        functions: Arc<FunctionManager>,
        graphs: Arc<GraphStore>,
    ) -> Self {
        let config = RuntimeConfig::default();
        Self {
            loader,
            registry,
            transport,
            jobs,
            functions,
            graphs,
            graph_executor: GraphExecutor::from_config(&config),
            remote_timeout: config.remote_timeout(),
            probe_window: config.probe_window(),
            accept_degraded: config.accept_degraded_executors,
        }
    }

    /// Applies deadlines and the degraded-executor policy from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &RuntimeConfig) -> Self {
        self.graph_executor = GraphExecutor::from_config(config);
        self.remote_timeout = config.remote_timeout();
        self.probe_window = config.probe_window();
        self.accept_degraded = config.accept_degraded_executors;
        self
    }

    /// Replaces the graph executor.
    #[must_use]
    pub fn with_graph_executor(mut self, executor: GraphExecutor) -> Self {
        self.graph_executor = executor;
        self
    }

    /// The policy loader.
    #[must_use]
    pub fn loader(&self) -> &Arc<PolicyLoader> {
        &self.loader
    }

    /// The executor registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    /// The job manager.
    #[must_use]
    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    /// The function manager.
    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionManager> {
        &self.functions
    }

    /// The graph store.
    #[must_use]
    pub fn graphs(&self) -> &Arc<GraphStore> {
        &self.graphs
    }

    /// Refreshes executor statuses, each probe bounded by the configured
    /// window. Resolution only ever reads the recorded statuses.
    pub async fn probe_executors(&self, probe: &dyn HealthProbe) -> ProbeReport {
        self.registry.probe_all(probe, self.probe_window).await
    }

    /// Executes a request in its mode.
    ///
    /// # Errors
    ///
    /// Any [`DispatchError`]; [`DispatchError::kind`] gives the category.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionResponse, DispatchError> {
        let mode = request.mode;
        let target = request.target.clone();
        debug!(mode = %mode, target = %target, "dispatching");

        let result = match mode {
            ExecutionMode::Local => self.local(request).await.map(ExecutionResponse::Output),
            ExecutionMode::Remote => self.remote(request).await.map(ExecutionResponse::Output),
            ExecutionMode::Job => self.job(request).await.map(ExecutionResponse::Job),
            ExecutionMode::Function => {
                let call = self
                    .functions
                    .invoke_function(&request.target, request.input);
                deadline(&request.target, request.timeout, call)
                    .await
                    .map(ExecutionResponse::Output)
            }
            ExecutionMode::Graph => self.graph(request).await.map(ExecutionResponse::Graph),
        };

        if let Err(err) = &result {
            warn!(mode = %mode, target = %target, kind = %err.kind(), error = %err, "dispatch failed");
        }
        result
    }

    /// Sends a management command to a `local`, `remote`, or `function`
    /// instance.
    ///
    /// A local command reaches the cached instance that `local` execution
    /// with the same overrides uses. A remote command runs against a fresh
    /// instance on the executor.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidRequest`] for `job` and `graph` mode, otherwise
    /// as for [`execute`](Self::execute).
    pub async fn manage(&self, request: ManageRequest) -> Result<Value, DispatchError> {
        match request.mode {
            ExecutionMode::Local => {
                let uri: PolicyRuleUri = request.target.parse()?;
                let instance = self
                    .loader
                    .load(&uri, ExecutionMode::Local, &request.overrides, None)
                    .await?;
                Ok(instance.manage(&request.action, request.data).await?)
            }
            ExecutionMode::Remote => {
                let uri: PolicyRuleUri = request.target.parse()?;
                let rule = self.loader.rule(&uri).await?;
                ensure_mode(&rule, ExecutionMode::Remote)?;
                let executor = self
                    .resolve(request.executor_id.as_deref(), Value::Null)
                    .await?;
                let body = RemoteManage {
                    policy_rule_uri: uri,
                    action: request.action,
                    data: request.data,
                    overrides: request.overrides,
                };
                let call = self.transport.manage(&executor, &body);
                deadline(&executor.executor_id, Some(self.remote_timeout), call).await
            }
            ExecutionMode::Function => {
                self.functions
                    .manage_function(&request.target, &request.action, request.data)
                    .await
            }
            mode @ (ExecutionMode::Job | ExecutionMode::Graph) => Err(DispatchError::invalid(
                format!("management is not supported in {mode} mode"),
            )),
        }
    }

    async fn local(&self, request: ExecutionRequest) -> Result<Value, DispatchError> {
        let uri: PolicyRuleUri = request.target.parse()?;
        let instance = self
            .loader
            .load(&uri, ExecutionMode::Local, &request.overrides, None)
            .await?;
        let input = request.input;
        deadline(&request.target, request.timeout, async move {
            Ok::<_, DispatchError>(instance.evaluate(input).await?)
        })
        .await
    }

    async fn remote(&self, request: ExecutionRequest) -> Result<Value, DispatchError> {
        let uri: PolicyRuleUri = request.target.parse()?;
        let rule = self.loader.rule(&uri).await?;
        ensure_mode(&rule, ExecutionMode::Remote)?;

        let executor = self
            .resolve(request.executor_id.as_deref(), request.hints)
            .await?;
        let body = RemoteEvaluate {
            policy_rule_uri: uri,
            input: request.input,
            overrides: request.overrides,
        };
        let timeout = request.timeout.unwrap_or(self.remote_timeout);
        let call = self.transport.evaluate(&executor, &body);
        deadline(&executor.executor_id, Some(timeout), call).await
    }

    async fn job(&self, request: ExecutionRequest) -> Result<JobHandle, DispatchError> {
        let uri: PolicyRuleUri = request.target.parse()?;
        let rule = self.loader.rule(&uri).await?;
        ensure_mode(&rule, ExecutionMode::Job)?;

        let executor = self
            .resolve(request.executor_id.as_deref(), request.hints)
            .await?;
        self.jobs
            .submit_job(&executor, &uri, request.overrides, request.input)
            .await
    }

    async fn graph(&self, request: ExecutionRequest) -> Result<GraphOutcome, DispatchError> {
        let spec = self.graphs.get(&request.target)?;
        // Every node must be deployed before the first wave runs.
        if let Some(missing) = spec
            .function_ids
            .iter()
            .find(|id| self.functions.get_function(id).is_none())
        {
            return Err(DispatchError::not_found("function", missing.clone()));
        }
        let executor = match request.timeout {
            Some(timeout) => self.graph_executor.clone().with_timeout(timeout),
            None => self.graph_executor.clone(),
        };
        Ok(executor
            .execute(&spec, request.input, self.functions.as_ref())
            .await?)
    }

    async fn resolve(
        &self,
        executor_id: Option<&str>,
        hints: Value,
    ) -> Result<PolicyExecutor, DispatchError> {
        let options = ResolveOptions::default()
            .accept_degraded(self.accept_degraded)
            .with_hints(hints);
        Ok(self.registry.resolve(executor_id, &options).await?)
    }
}

async fn deadline<T>(
    target: &str,
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T, DispatchError>>,
) -> Result<T, DispatchError> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| DispatchError::unavailable(target, format!("timed out after {timeout:?}")))?,
        None => call.await,
    }
}
