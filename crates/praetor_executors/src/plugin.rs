//! Installs the [`ExecutorRegistry`] global.

use praetor_policy::{Overrides, PoliciesPlugin, PolicyLoader, PolicyRuleUri};
use praetor_system::plugin::{Plugin, PluginId};
use praetor_system::server::Server;

use crate::allocator::ResourceAllocator;
use crate::executor::PolicyExecutor;
use crate::registry::ExecutorRegistry;

/// Provides the executor registry.
///
/// Executors given here are registered during `build()`. When an allocator
/// rule is configured the plugin depends on [`PoliciesPlugin`] and binds the
/// allocator during `ready()`; the rule itself is loaded on first use.
///
/// ```
/// use praetor_executors::{ExecutorRegistry, ExecutorStatus, ExecutorsPlugin, PolicyExecutor};
/// use praetor_system::server::Server;
///
/// let mut server = Server::new();
/// server.add_plugins(
///     ExecutorsPlugin::new()
///         .with_executor(PolicyExecutor::new("executor-001", "http://10.1.0.5:8080").with_status(ExecutorStatus::Healthy)),
/// );
/// server.finish();
///
/// assert_eq!(server.global::<ExecutorRegistry>().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutorsPlugin {
    executors: Vec<PolicyExecutor>,
    allocator: Option<(PolicyRuleUri, Overrides)>,
}

impl ExecutorsPlugin {
    /// Creates a plugin with no executors and no allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor at startup.
    #[must_use]
    pub fn with_executor(mut self, executor: PolicyExecutor) -> Self {
        self.executors.push(executor);
        self
    }

    /// Uses the given rule as the resource allocator.
    #[must_use]
    pub fn with_allocator(mut self, uri: PolicyRuleUri, overrides: Overrides) -> Self {
        self.allocator = Some((uri, overrides));
        self
    }
}

impl Plugin for ExecutorsPlugin {
    fn build(&self, server: &mut Server) {
        let registry = ExecutorRegistry::new();
        for executor in &self.executors {
            if let Err(err) = registry.register(executor.clone()) {
                panic!("ExecutorsPlugin: {err}");
            }
        }
        server.insert_global(registry);
    }

    fn ready(&self, server: &mut Server) {
        let Some((uri, overrides)) = &self.allocator else {
            return;
        };
        let loader = server
            .global::<PolicyLoader>()
            .expect("PoliciesPlugin installs PolicyLoader before ExecutorsPlugin is ready");
        let registry = server
            .global::<ExecutorRegistry>()
            .expect("ExecutorRegistry is inserted during build");
        registry.set_allocator(ResourceAllocator::from_rule(
            loader,
            uri.clone(),
            overrides.clone(),
        ));
    }

    fn dependencies(&self) -> Vec<PluginId> {
        if self.allocator.is_some() {
            vec![PluginId::of::<PoliciesPlugin>()]
        } else {
            Vec::new()
        }
    }
}
