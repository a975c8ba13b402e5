//! Server runtime for plugin orchestration.
//!
//! The [`Server`] owns plugins and resources and nothing else. Registries,
//! dispatchers, and logging are all installed by plugins.
//!
//! # Lifecycle
//!
//! 1. **Dependency Resolution** - Validate and topologically sort plugins
//! 2. **Build Phase** - Call `plugin.build()` in dependency order
//! 3. **Ready Phase** - Call `plugin.ready()` in dependency order
//! 4. **Cleanup Phase** - Call `plugin.cleanup()` in reverse order

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::plugin::{Plugin, PluginId, Plugins};
use crate::resource::{GlobalResource, Globals, Resource, ResourceRef, ResourceRefMut, Resources};

/// Represents the build state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BuildState {
    #[default]
    NotStarted,
    Building,
    Built,
}

/// Internal entry for a registered plugin.
struct PluginEntry {
    id: PluginId,
    plugin: Box<dyn Plugin>,
    name: String,
}

/// The runtime that orchestrates plugins and manages resources.
///
/// # Example
///
/// ```ignore
/// let mut server = Server::new();
/// server
///     .add_plugins(DefaultPlugins.build())
///     .add_plugins(PoliciesPlugin::default())
///     .add_plugins(RuntimePlugin);
/// server.finish();
///
/// let dispatcher = server.global::<Dispatcher>().unwrap();
/// ```
#[derive(Default)]
pub struct Server {
    /// Frozen, shared resources available after `ready()`.
    globals: Globals,
    /// Mutable build-phase resources.
    resources: Resources,
    pending_plugins: Vec<PluginEntry>,
    /// Plugins that have been built, in dependency order.
    built_plugins: Vec<PluginEntry>,
    plugin_ids: HashSet<PluginId>,
    build_state: BuildState,
}

impl Server {
    /// Creates a new empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugin Management
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds one or more plugins to the server.
    ///
    /// # Panics
    ///
    /// Panics if a unique plugin is added twice.
    pub fn add_plugins<P: Plugins>(&mut self, plugins: P) -> &mut Self {
        plugins.add_to_server(self);
        self
    }

    pub(crate) fn add_plugin_boxed(&mut self, id: PluginId, plugin: Box<dyn Plugin>) {
        let name = plugin.name().to_string();

        if plugin.is_unique() && self.plugin_ids.contains(&id) {
            panic!(
                "Plugin '{}' is unique and was already added.\n\
                 If you intended to add this plugin multiple times, \
                 set `is_unique()` to return `false`.",
                name
            );
        }
        self.plugin_ids.insert(id);

        let entry = PluginEntry { id, plugin, name };

        // Sub-plugins added from inside build() are built immediately.
        if self.build_state == BuildState::Building {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        } else {
            self.pending_plugins.push(entry);
        }
    }

    /// Returns true if a plugin of the given type has been added.
    #[must_use]
    pub fn has_plugin<P: Plugin>(&self) -> bool {
        self.plugin_ids.contains(&PluginId::of::<P>())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Build-phase Resources
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts a mutable build-phase resource, returning the value it replaced.
    pub fn insert_resource<R: Resource>(&mut self, resource: R) -> Option<R> {
        self.resources.insert(resource)
    }

    /// Returns true if a resource of type `R` exists.
    #[must_use]
    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.resources.contains::<R>()
    }

    /// Gets an immutable guard to a build-phase resource.
    #[must_use]
    pub fn get_resource<R: Resource>(&self) -> Option<ResourceRef<'_, R>> {
        self.resources.get::<R>().ok()
    }

    /// Gets a mutable guard to a build-phase resource.
    ///
    /// Returns `None` if the resource doesn't exist or is already borrowed.
    #[must_use]
    pub fn get_resource_mut<R: Resource>(&self) -> Option<ResourceRefMut<'_, R>> {
        self.resources.get_mut::<R>().ok()
    }

    /// Removes a build-phase resource and returns it.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        self.resources.remove::<R>()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Globals
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts a global resource. Returns `true` if one was replaced.
    pub fn insert_global<R: GlobalResource>(&mut self, resource: R) -> bool {
        self.globals.insert(resource)
    }

    /// Inserts an already shared global resource.
    pub fn insert_global_arc<R: GlobalResource>(&mut self, resource: Arc<R>) -> bool {
        self.globals.insert_arc(resource)
    }

    /// Returns true if a global resource of type `R` exists.
    #[must_use]
    pub fn contains_global<R: GlobalResource>(&self) -> bool {
        self.globals.contains::<R>()
    }

    /// Returns a shared handle to a global resource.
    #[must_use]
    pub fn global<R: GlobalResource>(&self) -> Option<Arc<R>> {
        self.globals.get::<R>()
    }

    /// Returns whether [`finish()`](Self::finish) has completed.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.build_state == BuildState::Built
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds all plugins and prepares the server for execution.
    ///
    /// # Panics
    ///
    /// - If a plugin's dependency is not satisfied
    /// - If there is a circular dependency between plugins
    /// - If called more than once
    pub fn finish(&mut self) {
        if self.build_state != BuildState::NotStarted {
            panic!("Server::finish() was already called. Cannot build twice.");
        }

        let sorted_plugins = self.sort_plugins_by_dependencies();

        self.build_state = BuildState::Building;
        for entry in sorted_plugins {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        }

        let mut plugins = core::mem::take(&mut self.built_plugins);
        for entry in &plugins {
            entry.plugin.ready(self);
        }
        plugins.append(&mut self.built_plugins);
        self.built_plugins = plugins;

        self.build_state = BuildState::Built;
    }

    /// Cleans up all plugins in reverse dependency order.
    pub fn cleanup(&mut self) {
        let plugins = core::mem::take(&mut self.built_plugins);
        for entry in plugins.iter().rev() {
            entry.plugin.cleanup(self);
        }
        self.built_plugins = plugins;
    }

    /// Sorts pending plugins by dependencies using Kahn's algorithm.
    ///
    /// # Panics
    ///
    /// - If a plugin's dependency is not found
    /// - If there is a circular dependency
    fn sort_plugins_by_dependencies(&mut self) -> Vec<PluginEntry> {
        let pending = core::mem::take(&mut self.pending_plugins);
        let n = pending.len();

        let index_of: HashMap<PluginId, usize> = pending
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id, i))
            .collect();

        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, entry) in pending.iter().enumerate() {
            for dep in entry.plugin.dependencies() {
                match index_of.get(&dep) {
                    Some(&dep_idx) => {
                        dependents[dep_idx].push(i);
                        in_degree[i] += 1;
                    }
                    None => {
                        if !self.built_plugins.iter().any(|p| p.id == dep) {
                            panic!(
                                "Plugin '{}' requires '{}' which was not added.\n\
                                 Add {} before {}, or use a plugin group that includes it.",
                                entry.name,
                                dep.type_name(),
                                dep.type_name(),
                                entry.name
                            );
                        }
                    }
                }
            }
        }

        // Seed in insertion order so independent plugins build in the order added.
        let mut queue: std::collections::VecDeque<usize> =
            (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted_indices = Vec::with_capacity(n);

        while let Some(idx) = queue.pop_front() {
            sorted_indices.push(idx);
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if sorted_indices.len() != n {
            let in_cycle: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(i, _)| pending[i].name.as_str())
                .collect();
            panic!(
                "Circular dependency detected among plugins: {:?}\n\
                 Break the cycle by extracting shared functionality into a separate plugin.",
                in_cycle
            );
        }

        let mut slots: Vec<Option<PluginEntry>> = pending.into_iter().map(Some).collect();
        sorted_indices
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct BuildLog(Mutex<Vec<&'static str>>);
    impl GlobalResource for BuildLog {}

    fn log(server: &Server, entry: &'static str) {
        server
            .get_resource::<Arc<BuildLog>>()
            .expect("log resource")
            .0
            .lock()
            .push(entry);
    }

    struct First;
    impl Plugin for First {
        fn build(&self, server: &mut Server) {
            log(server, "first");
        }
    }

    struct Second;
    impl Plugin for Second {
        fn build(&self, server: &mut Server) {
            log(server, "second");
        }
        fn dependencies(&self) -> Vec<PluginId> {
            vec![PluginId::of::<First>()]
        }
    }

    #[test]
    fn dependencies_build_first() {
        let log_handle = Arc::new(BuildLog::default());
        let mut server = Server::new();
        server.insert_resource(Arc::clone(&log_handle));
        server.add_plugins(Second).add_plugins(First);
        server.finish();

        assert_eq!(*log_handle.0.lock(), vec!["first", "second"]);
        assert!(server.is_built());
    }

    #[test]
    #[should_panic(expected = "requires")]
    fn missing_dependency_panics() {
        let mut server = Server::new();
        server.insert_resource(Arc::new(BuildLog::default()));
        server.add_plugins(Second);
        server.finish();
    }

    struct Loop1;
    struct Loop2;
    impl Plugin for Loop1 {
        fn build(&self, _server: &mut Server) {}
        fn dependencies(&self) -> Vec<PluginId> {
            vec![PluginId::of::<Loop2>()]
        }
    }
    impl Plugin for Loop2 {
        fn build(&self, _server: &mut Server) {}
        fn dependencies(&self) -> Vec<PluginId> {
            vec![PluginId::of::<Loop1>()]
        }
    }

    #[test]
    #[should_panic(expected = "Circular dependency")]
    fn circular_dependency_panics() {
        let mut server = Server::new();
        server.add_plugins(Loop1).add_plugins(Loop2);
        server.finish();
    }

    #[test]
    #[should_panic(expected = "already added")]
    fn unique_plugin_added_twice_panics() {
        let mut server = Server::new();
        server.add_plugins(Loop1).add_plugins(Loop1);
    }

    struct Freezer;
    impl Plugin for Freezer {
        fn build(&self, server: &mut Server) {
            server.insert_resource(Vec::<u32>::new());
        }
        fn ready(&self, server: &mut Server) {
            let pending = server
                .remove_resource::<Vec<u32>>()
                .expect("registry from build phase");
            server.insert_global(Frozen(pending));
        }
    }

    struct Frozen(Vec<u32>);
    impl GlobalResource for Frozen {}

    struct Contributor;
    impl Plugin for Contributor {
        fn build(&self, server: &mut Server) {
            server
                .get_resource_mut::<Vec<u32>>()
                .expect("Freezer must be added first")
                .push(7);
        }
        fn dependencies(&self) -> Vec<PluginId> {
            vec![PluginId::of::<Freezer>()]
        }
    }

    #[test]
    fn registry_is_frozen_into_global_at_ready() {
        let mut server = Server::new();
        server.add_plugins(Contributor).add_plugins(Freezer);
        server.finish();

        assert!(!server.contains_resource::<Vec<u32>>());
        let frozen = server.global::<Frozen>().unwrap();
        assert_eq!(frozen.0, vec![7]);
    }
}
