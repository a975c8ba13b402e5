//! Stateful function deployments.
//!
//! A function is a long-lived instance of a stateful rule, cached under its
//! function id so its context persists across invocations. The rule's schemas,
//! settings, and parameters are pinned at deploy time: the instance holds the
//! rule it was built from, and later edits to the rule do not reach it.

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashSet;
use indexmap::IndexMap;
use parking_lot::RwLock;
use praetor_executors::{ExecutorRegistry, ResolveOptions};
use praetor_graph::{NodeFailure, NodeInvoker};
use praetor_policy::{
    ExecutionMode, JsonMap, Overrides, PolicyInstance, PolicyLoader, PolicyRuleUri,
};
use praetor_system::resource::GlobalResource;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::mode::ensure_mode;
use crate::platform::{Autoscaling, DeploymentSpec, OrchestrationPlatform, PlatformHandle};

/// A request to deploy a function.
///
/// ```
/// use praetor_runtime::{Autoscaling, FunctionDeployment};
///
/// let deployment = FunctionDeployment::new("funcB", "ip-allowlist:1.0-stable".parse().unwrap())
///     .with_replicas(2)
///     .with_autoscaling(Autoscaling::between(2, 6, 0.7));
/// assert_eq!(deployment.executor_id, None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeployment {
    /// Function id; also the graph node id.
    pub function_id: String,
    /// Rule to deploy.
    pub policy_rule_uri: PolicyRuleUri,
    /// Executor to deploy on; allocated when absent.
    pub executor_id: Option<String>,
    /// Settings and parameters overrides.
    pub overrides: Overrides,
    /// Initial replicas.
    pub replicas: u32,
    /// Autoscaling configuration.
    pub autoscaling: Autoscaling,
    /// Hints for the resource allocator.
    pub hints: Value,
    /// Search tags.
    pub tags: Vec<String>,
    /// Free-form metadata.
    pub metadata: JsonMap,
}

impl FunctionDeployment {
    /// A single-replica deployment of `policy_rule_uri`.
    pub fn new(function_id: impl Into<String>, policy_rule_uri: PolicyRuleUri) -> Self {
        Self {
            function_id: function_id.into(),
            policy_rule_uri,
            executor_id: None,
            overrides: Overrides::none(),
            replicas: 1,
            autoscaling: Autoscaling::default(),
            hints: Value::Null,
            tags: Vec::new(),
            metadata: JsonMap::new(),
        }
    }

    /// Deploys on the named executor.
    #[must_use]
    pub fn with_executor(mut self, executor_id: impl Into<String>) -> Self {
        self.executor_id = Some(executor_id.into());
        self
    }

    /// Sets the overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Sets the initial replica count.
    #[must_use]
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Sets the autoscaling configuration.
    #[must_use]
    pub fn with_autoscaling(mut self, autoscaling: Autoscaling) -> Self {
        self.autoscaling = autoscaling;
        self
    }

    /// Sets the allocator hints.
    #[must_use]
    pub fn with_hints(mut self, hints: Value) -> Self {
        self.hints = hints;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// The record of a deployed function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    /// Function id.
    pub function_id: String,
    /// Executor hosting it.
    pub function_executor_id: String,
    /// That executor's endpoint.
    pub function_executor_uri: String,
    /// The deployed rule.
    pub function_policy_rule_uri: PolicyRuleUri,
    /// Rule projection, settings, and parameters as of deployment.
    pub function_policy_data: Value,
    /// Initial replicas.
    pub replicas: u32,
    /// Autoscaling configuration.
    pub autoscaling: Autoscaling,
    /// Search tags.
    pub tags: Vec<String>,
    /// Free-form metadata.
    pub metadata: JsonMap,
    /// Platform deployment handle.
    pub handle: PlatformHandle,
}

struct Deployed {
    record: Function,
    instance: Arc<PolicyInstance>,
    removed: watch::Sender<bool>,
}

impl Deployed {
    /// Runs `call` unless the function is removed first.
    async fn guard<T>(
        &self,
        call: impl Future<Output = Result<T, DispatchError>>,
    ) -> Result<T, DispatchError> {
        let mut removed = self.removed.subscribe();
        let function_id = &self.record.function_id;
        tokio::select! {
            result = call => {
                if *self.removed.borrow() {
                    return Err(DispatchError::unavailable(function_id, "function was removed"));
                }
                result
            }
            _ = removed.wait_for(|removed| *removed) => {
                Err(DispatchError::unavailable(function_id, "function was removed"))
            }
        }
    }
}

/// Deploys, invokes, and removes functions.
pub struct FunctionManager {
    loader: Arc<PolicyLoader>,
    registry: Arc<ExecutorRegistry>,
    platform: Arc<dyn OrchestrationPlatform>,
    accept_degraded: bool,
    functions: RwLock<IndexMap<String, Arc<Deployed>>>,
    removed: RwLock<HashSet<String>>,
}

impl GlobalResource for FunctionManager {}

impl core::fmt::Debug for FunctionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FunctionManager")
            .field("functions", &self.functions.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FunctionManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(
        loader: Arc<PolicyLoader>,
        registry: Arc<ExecutorRegistry>,
        platform: Arc<dyn OrchestrationPlatform>,
    ) -> Self {
        Self {
            loader,
            registry,
            platform,
            accept_degraded: false,
            functions: RwLock::new(IndexMap::new()),
            removed: RwLock::new(HashSet::new()),
        }
    }

    /// Allows explicitly named executors that are not healthy.
    #[must_use]
    pub fn accept_degraded(mut self, accept: bool) -> Self {
        self.accept_degraded = accept;
        self
    }

    /// Deploys a function and constructs its stateful instance.
    ///
    /// Without an executor id, one is chosen by the resource allocator.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidRequest`] for a taken id, zero replicas,
    ///   invalid autoscaling, or a stateless rule
    /// - registry errors from executor resolution
    /// - policy errors from loading the instance
    /// - the platform's error if it refuses the deployment
    pub async fn deploy_function(
        &self,
        deployment: FunctionDeployment,
    ) -> Result<Function, DispatchError> {
        let function_id = deployment.function_id.clone();
        if self.functions.read().contains_key(&function_id) {
            return Err(DispatchError::invalid(format!(
                "function {function_id} is already deployed"
            )));
        }
        if deployment.replicas == 0 {
            return Err(DispatchError::invalid("replicas must be at least 1"));
        }
        deployment.autoscaling.validate()?;

        let uri = &deployment.policy_rule_uri;
        let rule = self.loader.rule(uri).await?;
        ensure_mode(&rule, ExecutionMode::Function)?;

        let options = ResolveOptions::default()
            .accept_degraded(self.accept_degraded)
            .with_hints(deployment.hints.clone());
        let executor = self
            .registry
            .resolve(deployment.executor_id.as_deref(), &options)
            .await?;

        let instance = self
            .loader
            .load(
                uri,
                ExecutionMode::Function,
                &deployment.overrides,
                Some(function_id.as_str()),
            )
            .await?;

        let spec = DeploymentSpec {
            function_id: function_id.clone(),
            executor: executor.clone(),
            policy_rule_uri: uri.clone(),
            replicas: deployment.replicas,
            autoscaling: deployment.autoscaling,
        };
        let handle = match self.platform.deploy(spec).await {
            Ok(handle) => handle,
            Err(err) => {
                self.loader.evict(instance.key());
                return Err(err);
            }
        };

        let parameters = instance.parameters().await;
        let record = Function {
            function_id: function_id.clone(),
            function_executor_id: executor.executor_id.clone(),
            function_executor_uri: executor.executor_host_uri.clone(),
            function_policy_rule_uri: uri.clone(),
            function_policy_data: json!({
                "rule": instance.rule().projection(),
                "settings": instance.settings(),
                "parameters": parameters,
            }),
            replicas: deployment.replicas,
            autoscaling: deployment.autoscaling,
            tags: deployment.tags,
            metadata: deployment.metadata,
            handle,
        };

        let (removed, _) = watch::channel(false);
        let deployed = Arc::new(Deployed {
            record: record.clone(),
            instance,
            removed,
        });
        self.functions
            .write()
            .insert(function_id.clone(), deployed);
        self.removed.write().remove(&function_id);

        info!(function_id = %function_id, executor_id = %executor.executor_id, policy_rule_uri = %uri, "function deployed");
        Ok(record)
    }

    fn deployed(&self, function_id: &str) -> Result<Arc<Deployed>, DispatchError> {
        if let Some(deployed) = self.functions.read().get(function_id) {
            return Ok(Arc::clone(deployed));
        }
        if self.removed.read().contains(function_id) {
            Err(DispatchError::unavailable(function_id, "function was removed"))
        } else {
            Err(DispatchError::not_found("function", function_id))
        }
    }

    /// Evaluates `input` on the function's instance.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NotFound`] for an unknown function
    /// - [`DispatchError::Unavailable`] if the function is removed before or
    ///   during the call
    /// - policy errors from evaluation
    pub async fn invoke_function(
        &self,
        function_id: &str,
        input: Value,
    ) -> Result<Value, DispatchError> {
        let deployed = self.deployed(function_id)?;
        deployed
            .guard(async { Ok::<_, DispatchError>(deployed.instance.evaluate(input).await?) })
            .await
    }

    /// Runs a management command on the function's instance.
    ///
    /// # Errors
    ///
    /// Same as [`invoke_function`](Self::invoke_function), plus unknown actions.
    pub async fn manage_function(
        &self,
        function_id: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, DispatchError> {
        let deployed = self.deployed(function_id)?;
        deployed
            .guard(async { Ok::<_, DispatchError>(deployed.instance.manage(action, data).await?) })
            .await
    }

    /// Tears down a function. In-flight and later calls fail as unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown function. A platform
    /// failure during teardown is logged; the function is removed regardless.
    pub async fn remove_function(&self, function_id: &str) -> Result<Function, DispatchError> {
        let deployed = self
            .functions
            .write()
            .shift_remove(function_id)
            .ok_or_else(|| DispatchError::not_found("function", function_id))?;
        self.removed.write().insert(function_id.to_string());
        deployed.removed.send_replace(true);
        self.loader.evict(deployed.instance.key());

        if let Err(err) = self.platform.delete(&deployed.record.handle).await {
            warn!(function_id, error = %err, "platform teardown failed");
        }
        info!(function_id, "function removed");
        Ok(deployed.record.clone())
    }

    /// A deployed function's record.
    #[must_use]
    pub fn get_function(&self, function_id: &str) -> Option<Function> {
        self.functions
            .read()
            .get(function_id)
            .map(|deployed| deployed.record.clone())
    }

    /// Every deployed function, in deployment order.
    #[must_use]
    pub fn list_functions(&self) -> Vec<Function> {
        self.functions
            .read()
            .values()
            .map(|deployed| deployed.record.clone())
            .collect()
    }
}

#[async_trait]
impl NodeInvoker for FunctionManager {
    async fn invoke(&self, function_id: &str, input: Value) -> Result<Value, NodeFailure> {
        self.invoke_function(function_id, input)
            .await
            .map_err(DispatchError::into_node_failure)
    }
}
