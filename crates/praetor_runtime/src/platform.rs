//! The orchestration platform contract.
//!
//! Jobs and function deployments are handed to an [`OrchestrationPlatform`]
//! (a Kubernetes-like scheduler in production). [`InProcessPlatform`] runs
//! them on the local tokio runtime.

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use praetor_executors::PolicyExecutor;
use praetor_policy::{ExecutionMode, Overrides, PolicyLoader, PolicyRuleUri};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::jobs::JobReporter;

/// Opaque reference to a platform object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformHandle(pub String);

/// Replica autoscaling for a function deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Autoscaling {
    /// Whether the platform scales replicas.
    pub enabled: bool,
    /// Lower bound on replicas.
    pub min_replicas: u32,
    /// Upper bound on replicas.
    pub max_replicas: u32,
    /// Utilization the platform aims for, in `(0, 1]`.
    pub target_utilization: f64,
}

impl Default for Autoscaling {
    fn default() -> Self {
        Self {
            enabled: false,
            min_replicas: 1,
            max_replicas: 1,
            target_utilization: 0.8,
        }
    }
}

impl Autoscaling {
    /// Scaling between `min` and `max` replicas.
    #[must_use]
    pub fn between(min_replicas: u32, max_replicas: u32, target_utilization: f64) -> Self {
        Self {
            enabled: true,
            min_replicas,
            max_replicas,
            target_utilization,
        }
    }

    /// Checks `min ≤ max` and `0 < target ≤ 1`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidRequest`] describing the violation.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.min_replicas > self.max_replicas {
            return Err(DispatchError::invalid(format!(
                "min_replicas {} exceeds max_replicas {}",
                self.min_replicas, self.max_replicas
            )));
        }
        if !(self.target_utilization > 0.0 && self.target_utilization <= 1.0) {
            return Err(DispatchError::invalid(format!(
                "target_utilization {} is outside (0, 1]",
                self.target_utilization
            )));
        }
        Ok(())
    }
}

/// A one-shot execution handed to the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    /// Job id assigned by the job manager.
    pub job_id: String,
    /// Executor the job runs on.
    pub executor: PolicyExecutor,
    /// Rule to evaluate.
    pub policy_rule_uri: PolicyRuleUri,
    /// Settings and parameters overrides.
    pub overrides: Overrides,
    /// Evaluation input.
    pub inputs: Value,
}

/// A long-lived function deployment handed to the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentSpec {
    /// Function id.
    pub function_id: String,
    /// Executor hosting the function.
    pub executor: PolicyExecutor,
    /// Rule the function runs.
    pub policy_rule_uri: PolicyRuleUri,
    /// Initial replica count.
    pub replicas: u32,
    /// Autoscaling configuration.
    pub autoscaling: Autoscaling,
}

/// Schedules jobs and deployments.
#[async_trait]
pub trait OrchestrationPlatform: Send + Sync + 'static {
    /// Starts a job without waiting for it. Progress is reported through
    /// `reporter`.
    async fn submit_job(
        &self,
        spec: JobSpec,
        reporter: JobReporter,
    ) -> Result<PlatformHandle, DispatchError>;

    /// Creates a deployment.
    async fn deploy(&self, spec: DeploymentSpec) -> Result<PlatformHandle, DispatchError>;

    /// Tears down a job or deployment.
    async fn delete(&self, handle: &PlatformHandle) -> Result<(), DispatchError>;
}

type Objects = Arc<Mutex<HashMap<PlatformHandle, Option<tokio::task::JoinHandle<()>>>>>;

/// Runs jobs as tokio tasks and records deployments in memory.
///
/// A job's entry is released when its task finishes. Deployments stay until
/// deleted.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct InProcessPlatform {
    loader: Arc<PolicyLoader>,
    objects: Objects,
}

impl InProcessPlatform {
    /// Creates a platform that loads rules through `loader`.
    #[must_use]
    pub fn new(loader: Arc<PolicyLoader>) -> Self {
        Self {
            loader,
            objects: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of live jobs and deployments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Returns `true` if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl OrchestrationPlatform for InProcessPlatform {
    async fn submit_job(
        &self,
        spec: JobSpec,
        reporter: JobReporter,
    ) -> Result<PlatformHandle, DispatchError> {
        let handle = PlatformHandle(format!("job/{}", spec.job_id));
        let loader = Arc::clone(&self.loader);
        let objects = Arc::clone(&self.objects);
        let own = handle.clone();

        // The entry exists before the task can finish and release it.
        self.objects.lock().insert(handle.clone(), None);
        let task = tokio::spawn(async move {
            reporter.running();
            let result = async move {
                let instance = loader
                    .load_fresh(
                        &spec.policy_rule_uri,
                        ExecutionMode::Job,
                        &spec.overrides,
                        Some(spec.job_id.as_str()),
                    )
                    .await?;
                Ok::<_, DispatchError>(instance.evaluate(spec.inputs).await?)
            }
            .await;
            objects.lock().remove(&own);
            match result {
                Ok(output) => reporter.succeeded(output),
                Err(err) => reporter.failed(err.report()),
            }
        });

        if let Some(slot) = self.objects.lock().get_mut(&handle) {
            *slot = Some(task);
        }
        Ok(handle)
    }

    async fn deploy(&self, spec: DeploymentSpec) -> Result<PlatformHandle, DispatchError> {
        let handle = PlatformHandle(format!("deployment/{}", spec.function_id));
        debug!(function_id = %spec.function_id, replicas = spec.replicas, "deployment created");
        self.objects.lock().insert(handle.clone(), None);
        Ok(handle)
    }

    async fn delete(&self, handle: &PlatformHandle) -> Result<(), DispatchError> {
        let removed = self.objects.lock().remove(handle);
        match removed {
            Some(task) => {
                if let Some(task) = task {
                    // Aborting a finished job is a no-op.
                    task.abort();
                }
                info!(handle = %handle.0, "platform object deleted");
                Ok(())
            }
            None => Err(DispatchError::not_found("platform object", handle.0.clone())),
        }
    }
}
