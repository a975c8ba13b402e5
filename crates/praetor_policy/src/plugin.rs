//! Installs the [`PolicyLoader`] global.

use std::sync::Arc;

use praetor_system::plugin::Plugin;
use praetor_system::server::Server;

use crate::code::{CodeStore, ConstructRegistry, InMemoryCodeStore};
use crate::loader::PolicyLoader;
use crate::store::{InMemoryPolicyStore, PolicyStore};

/// Provides policy loading.
///
/// # Lifecycle
///
/// 1. **`build()`**: inserts a mutable [`ConstructRegistry`]. Plugins that
///    link policy code depend on `PoliciesPlugin` and register their
///    factories through [`Server::get_resource_mut`].
/// 2. **`ready()`**: freezes the registry and installs a [`PolicyLoader`]
///    global over the configured stores.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use praetor_policy::{InMemoryCodeStore, InMemoryPolicyStore, PoliciesPlugin, PolicyLoader};
/// use praetor_system::server::Server;
///
/// let rules = Arc::new(InMemoryPolicyStore::new());
/// let bundles = Arc::new(InMemoryCodeStore::new());
///
/// let mut server = Server::new();
/// server.add_plugins(PoliciesPlugin::new(rules, bundles));
/// server.finish();
///
/// assert!(server.contains_global::<PolicyLoader>());
/// ```
#[derive(Clone)]
pub struct PoliciesPlugin {
    store: Arc<dyn PolicyStore>,
    code: Arc<dyn CodeStore>,
}

impl Default for PoliciesPlugin {
    fn default() -> Self {
        Self::new(
            Arc::new(InMemoryPolicyStore::new()),
            Arc::new(InMemoryCodeStore::new()),
        )
    }
}

impl PoliciesPlugin {
    /// Creates the plugin over a rule store and a code store.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, code: Arc<dyn CodeStore>) -> Self {
        Self { store, code }
    }
}

impl Plugin for PoliciesPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_resource(ConstructRegistry::new());
    }

    fn ready(&self, server: &mut Server) {
        let constructs = server
            .remove_resource::<ConstructRegistry>()
            .expect("ConstructRegistry is inserted during build");
        tracing::info!(constructs = constructs.len(), "policy constructs registered");

        server.insert_global(PolicyLoader::new(
            Arc::clone(&self.store),
            Arc::clone(&self.code),
            Arc::new(constructs),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::PolicyConstruct;
    use crate::error::ConstructError;
    use crate::JsonMap;
    use praetor_system::plugin::PluginId;

    struct GeoPlugin;

    fn geo(
        _rule_id: &str,
        _settings: &JsonMap,
        _parameters: &JsonMap,
    ) -> Result<Box<dyn PolicyConstruct>, ConstructError> {
        Err(ConstructError::new("not needed"))
    }

    impl Plugin for GeoPlugin {
        fn build(&self, server: &mut Server) {
            server
                .get_resource_mut::<ConstructRegistry>()
                .expect("PoliciesPlugin must be added")
                .register("geo", geo);
        }

        fn dependencies(&self) -> Vec<PluginId> {
            vec![PluginId::of::<PoliciesPlugin>()]
        }
    }

    #[test]
    fn dependent_plugins_register_constructs() {
        let mut server = Server::new();
        server
            .add_plugins(GeoPlugin)
            .add_plugins(PoliciesPlugin::default());
        server.finish();

        assert!(!server.contains_resource::<ConstructRegistry>());
        let loader = server.global::<PolicyLoader>().unwrap();
        assert!(format!("{loader:?}").contains("geo"));
    }
}
