//! The executor registry and request-time resolution.

use core::time::Duration;
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::RwLock;
use praetor_system::resource::GlobalResource;
use serde_json::Value;

use crate::allocator::ResourceAllocator;
use crate::error::RegistryError;
use crate::executor::{ExecutorStatus, PolicyExecutor};
use crate::probe::{HealthProbe, ProbeReport};

/// Options for [`ExecutorRegistry::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Allow an explicitly named executor that is not healthy.
    pub accept_degraded: bool,
    /// Resource and affinity hints handed to the allocator policy.
    pub hints: Value,
}

impl ResolveOptions {
    /// Sets whether non-healthy executors may be used when named explicitly.
    #[must_use]
    pub fn accept_degraded(mut self, accept: bool) -> Self {
        self.accept_degraded = accept;
        self
    }

    /// Sets the allocator hints.
    #[must_use]
    pub fn with_hints(mut self, hints: Value) -> Self {
        self.hints = hints;
        self
    }
}

/// Known executors and the allocator used when none is named.
///
/// All methods take `&self`; the registry is shared as a global and updated
/// in place by probes and administrative calls. Locks are never held across
/// an `.await`.
///
/// # Example
///
/// ```
/// use praetor_executors::{ExecutorRegistry, ExecutorStatus, PolicyExecutor, ResolveOptions};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let registry = ExecutorRegistry::new();
/// registry
///     .register(PolicyExecutor::new("executor-001", "http://10.1.0.5:8080").with_status(ExecutorStatus::Healthy))
///     .unwrap();
///
/// let executor = registry.resolve(Some("executor-001"), &ResolveOptions::default()).await.unwrap();
/// assert_eq!(executor.executor_host_uri, "http://10.1.0.5:8080");
/// # });
/// ```
#[derive(Debug, Default)]
pub struct ExecutorRegistry {
    executors: RwLock<IndexMap<String, PolicyExecutor>>,
    allocator: RwLock<Option<Arc<ResourceAllocator>>>,
}

impl GlobalResource for ExecutorRegistry {}

impl ExecutorRegistry {
    /// Creates an empty registry without an allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if the id is taken.
    pub fn register(&self, executor: PolicyExecutor) -> Result<(), RegistryError> {
        let mut executors = self.executors.write();
        if executors.contains_key(&executor.executor_id) {
            return Err(RegistryError::AlreadyRegistered(executor.executor_id));
        }
        tracing::info!(executor_id = %executor.executor_id, host = %executor.executor_host_uri, "executor registered");
        executors.insert(executor.executor_id.clone(), executor);
        Ok(())
    }

    /// Records a new status, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id.
    pub fn update_status(
        &self,
        executor_id: &str,
        status: ExecutorStatus,
    ) -> Result<ExecutorStatus, RegistryError> {
        let mut executors = self.executors.write();
        let executor = executors
            .get_mut(executor_id)
            .ok_or_else(|| RegistryError::NotFound(executor_id.to_string()))?;
        let previous = core::mem::replace(&mut executor.executor_status, status);
        if previous != status {
            if status.is_healthy() {
                tracing::info!(executor_id, %previous, "executor healthy");
            } else {
                tracing::warn!(executor_id, %previous, %status, "executor not healthy");
            }
        }
        Ok(previous)
    }

    /// Decommissions an executor.
    pub fn remove(&self, executor_id: &str) -> Option<PolicyExecutor> {
        self.executors.write().shift_remove(executor_id)
    }

    /// Returns a copy of one record.
    #[must_use]
    pub fn get(&self, executor_id: &str) -> Option<PolicyExecutor> {
        self.executors.read().get(executor_id).cloned()
    }

    /// Returns copies of every record in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<PolicyExecutor> {
        self.executors.read().values().cloned().collect()
    }

    /// Number of registered executors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.read().len()
    }

    /// Returns `true` if no executor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.read().is_empty()
    }

    /// The registry as JSON, as handed to the allocator policy.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self.list()).unwrap_or(Value::Array(Vec::new()))
    }

    /// Installs the allocator used by [`resolve`](Self::resolve) when no
    /// executor is named.
    pub fn set_allocator(&self, allocator: ResourceAllocator) {
        tracing::info!(?allocator, "resource allocator installed");
        *self.allocator.write() = Some(Arc::new(allocator));
    }

    /// Returns `true` if an allocator is installed.
    #[must_use]
    pub fn has_allocator(&self) -> bool {
        self.allocator.read().is_some()
    }

    /// Picks the executor for a request.
    ///
    /// With an id (non-empty), the executor is looked up directly and must be
    /// healthy unless `accept_degraded` is set. Without one, the allocator
    /// policy chooses, and its answer must name a registered, healthy
    /// executor. Status is read as last recorded; nothing is probed here.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] / [`RegistryError::NotHealthy`] for a
    ///   named executor
    /// - [`RegistryError::Allocation`] / [`RegistryError::Allocator`] when
    ///   dynamic allocation fails
    pub async fn resolve(
        &self,
        executor_id: Option<&str>,
        options: &ResolveOptions,
    ) -> Result<PolicyExecutor, RegistryError> {
        if let Some(id) = executor_id.filter(|id| !id.is_empty()) {
            let executor = self
                .get(id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            if executor.executor_status.is_healthy() {
                return Ok(executor);
            }
            if options.accept_degraded {
                tracing::warn!(executor_id = id, status = %executor.executor_status, "using non-healthy executor");
                return Ok(executor);
            }
            return Err(RegistryError::NotHealthy {
                executor_id: executor.executor_id,
                status: executor.executor_status,
            });
        }

        let allocator = self
            .allocator
            .read()
            .clone()
            .ok_or_else(|| RegistryError::allocation("no executor named and no allocator configured"))?;
        let chosen = allocator.allocate(&options.hints, self.snapshot()).await?;

        match self.get(&chosen) {
            Some(executor) if executor.executor_status.is_healthy() => {
                tracing::debug!(executor_id = %chosen, "executor allocated");
                Ok(executor)
            }
            Some(executor) => Err(RegistryError::allocation(format!(
                "allocator chose {chosen}, which is {}",
                executor.executor_status
            ))),
            None => Err(RegistryError::allocation(format!(
                "allocator chose unknown executor {chosen}"
            ))),
        }
    }

    /// Probes every executor concurrently and records the answers.
    ///
    /// Each probe is bounded by `window`; a probe that does not answer in
    /// time marks its executor [`Unreachable`](ExecutorStatus::Unreachable).
    pub async fn probe_all(&self, probe: &dyn HealthProbe, window: Duration) -> ProbeReport {
        let executors = self.list();
        let answers = join_all(executors.iter().map(|executor| async move {
            let answer = tokio::time::timeout(window, probe.probe(executor)).await;
            (executor.executor_id.clone(), answer.ok())
        }))
        .await;

        let mut report = ProbeReport::default();
        for (executor_id, answer) in answers {
            let status = answer.unwrap_or_else(|| {
                report.timed_out.push(executor_id.clone());
                ExecutorStatus::Unreachable
            });
            // Executors removed mid-sweep are skipped.
            if self.update_status(&executor_id, status).is_ok() {
                report.statuses.push((executor_id, status));
            }
        }
        report
    }
}
