//! Installs the dispatch layer.

use std::sync::Arc;

use praetor_core_plugins::{ConfigPlugin, RuntimeConfig};
use praetor_executors::{ExecutorRegistry, ExecutorsPlugin};
use praetor_graph::{GraphExecutor, GraphPlugin, GraphSpec};
use praetor_policy::{PoliciesPlugin, PolicyLoader};
use praetor_system::plugin::{Plugin, PluginId};
use praetor_system::server::Server;

use crate::dispatcher::Dispatcher;
use crate::functions::FunctionManager;
use crate::graphs::GraphStore;
use crate::http::HttpTransport;
use crate::jobs::JobManager;
use crate::platform::{InProcessPlatform, OrchestrationPlatform};
use crate::remote::{LoopbackTransport, RemoteTransport, StatelessExecutorService};

/// Provides [`Dispatcher`] and the managers behind it.
///
/// # Lifecycle
///
/// 1. **`build()`**: inserts a [`GraphStore`] global holding the graphs given
///    through [`with_graph`](Self::with_graph).
/// 2. **`ready()`**: wires a [`StatelessExecutorService`], [`JobManager`],
///    [`FunctionManager`], and [`Dispatcher`] over the loader, registry, and
///    graph executor installed by the plugins this one depends on.
///
/// Remote calls go over [`HttpTransport`] unless another transport is given.
/// [`with_loopback`](Self::with_loopback) routes them to this process's own
/// [`StatelessExecutorService`] instead.
#[derive(Default)]
pub struct RuntimePlugin {
    transport: Option<Arc<dyn RemoteTransport>>,
    platform: Option<Arc<dyn OrchestrationPlatform>>,
    loopback: bool,
    graphs: Vec<GraphSpec>,
}

impl core::fmt::Debug for RuntimePlugin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuntimePlugin")
            .field("custom_transport", &self.transport.is_some())
            .field("custom_platform", &self.platform.is_some())
            .field("loopback", &self.loopback)
            .field("graphs", &self.graphs.len())
            .finish()
    }
}

impl RuntimePlugin {
    /// Creates the plugin with HTTP transport and the in-process platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `transport` for remote calls.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses `platform` for jobs and deployments.
    #[must_use]
    pub fn with_platform(mut self, platform: Arc<dyn OrchestrationPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Serves remote calls from this process.
    #[must_use]
    pub fn with_loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Registers a graph at startup.
    #[must_use]
    pub fn with_graph(mut self, spec: GraphSpec) -> Self {
        self.graphs.push(spec);
        self
    }
}

impl Plugin for RuntimePlugin {
    fn build(&self, server: &mut Server) {
        let graphs = GraphStore::new();
        for spec in &self.graphs {
            if let Err(err) = graphs.register(spec.clone()) {
                panic!("RuntimePlugin: {err}");
            }
        }
        server.insert_global(graphs);
    }

    fn ready(&self, server: &mut Server) {
        let loader = server
            .global::<PolicyLoader>()
            .expect("PoliciesPlugin installs PolicyLoader before RuntimePlugin is ready");
        let registry = server
            .global::<ExecutorRegistry>()
            .expect("ExecutorsPlugin installs ExecutorRegistry during build");
        let config = server
            .global::<RuntimeConfig>()
            .expect("ConfigPlugin installs RuntimeConfig during build");
        let graph_executor = server
            .global::<GraphExecutor>()
            .expect("GraphPlugin installs GraphExecutor during build");
        let graphs = server
            .global::<GraphStore>()
            .expect("GraphStore is inserted during build");

        let service = Arc::new(StatelessExecutorService::new(Arc::clone(&loader)));
        server.insert_global_arc(Arc::clone(&service));

        let transport: Arc<dyn RemoteTransport> = match (&self.transport, self.loopback) {
            (Some(transport), _) => Arc::clone(transport),
            (None, true) => Arc::new(LoopbackTransport::new(service)),
            (None, false) => Arc::new(HttpTransport::from_config(&config)),
        };
        let platform: Arc<dyn OrchestrationPlatform> = match &self.platform {
            Some(platform) => Arc::clone(platform),
            None => Arc::new(InProcessPlatform::new(Arc::clone(&loader))),
        };

        let jobs = Arc::new(JobManager::new(Arc::clone(&platform)));
        server.insert_global_arc(Arc::clone(&jobs));

        let functions = Arc::new(
            FunctionManager::new(Arc::clone(&loader), Arc::clone(&registry), platform)
                .accept_degraded(config.accept_degraded_executors),
        );
        server.insert_global_arc(Arc::clone(&functions));

        let dispatcher = Dispatcher::new(loader, registry, transport, jobs, functions, graphs)
            .with_config(&config)
            .with_graph_executor((*graph_executor).clone());
        tracing::debug!(?dispatcher, "dispatcher ready");
        server.insert_global(dispatcher);
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![
            PluginId::of::<ConfigPlugin>(),
            PluginId::of::<PoliciesPlugin>(),
            PluginId::of::<ExecutorsPlugin>(),
            PluginId::of::<GraphPlugin>(),
        ]
    }
}
