use praetor_core_plugins::{ConfigPlugin, RuntimeConfig};
use praetor_system::plugin::{Plugin, PluginId};
use praetor_system::server::Server;

use crate::executor::GraphExecutor;

/// Installs a [`GraphExecutor`] global configured from [`RuntimeConfig`].
#[derive(Debug, Default)]
pub struct GraphPlugin;

impl Plugin for GraphPlugin {
    fn build(&self, server: &mut Server) {
        let executor = server
            .global::<RuntimeConfig>()
            .map(|config| GraphExecutor::from_config(&config))
            .unwrap_or_default();
        tracing::debug!(timeout = ?executor.timeout(), "graph executor configured");
        server.insert_global(executor);
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<ConfigPlugin>()]
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;

    #[test]
    fn executor_follows_config() {
        let mut server = Server::new();
        server
            .add_plugins(ConfigPlugin::new(
                RuntimeConfig::default()
                    .with_graph_timeout(Duration::from_millis(250))
                    .with_max_wave_concurrency(2),
            ))
            .add_plugins(GraphPlugin);
        server.finish();

        let executor = server.global::<GraphExecutor>().unwrap();
        assert_eq!(executor.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(
            *executor,
            GraphExecutor::new()
                .with_timeout(Duration::from_millis(250))
                .with_max_concurrency(2)
        );
    }
}
