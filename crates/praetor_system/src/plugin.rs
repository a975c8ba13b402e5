//! Plugin system for extensible server functionality.
//!
//! Every registry, dispatcher, and ambient concern in Praetor is installed by a
//! plugin. The server only orders plugins and drives their lifecycle.
//!
//! # Example
//!
//! ```
//! use praetor_system::plugin::{Plugin, PluginId};
//! use praetor_system::server::Server;
//!
//! # struct TracingPlugin;
//! # impl Plugin for TracingPlugin {
//! #     fn build(&self, _server: &mut Server) {}
//! # }
//! # struct ProbeSettings { window_ms: u64 }
//!
//! struct ProbePlugin {
//!     window_ms: u64,
//! }
//!
//! impl Plugin for ProbePlugin {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_resource(ProbeSettings { window_ms: self.window_ms });
//!     }
//!
//!     fn dependencies(&self) -> Vec<PluginId> {
//!         vec![PluginId::of::<TracingPlugin>()]
//!     }
//! }
//!
//! Server::new()
//!     .add_plugins(TracingPlugin)
//!     .add_plugins(ProbePlugin { window_ms: 250 })
//!     .finish();
//! ```

use core::any::TypeId;

use crate::server::Server;

// ─────────────────────────────────────────────────────────────────────────────
// PluginId
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a plugin type.
///
/// Used for dependency resolution and duplicate detection. Based on [`TypeId`],
/// so each plugin type has exactly one `PluginId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId {
    type_id: TypeId,
    type_name: &'static str,
}

impl PluginId {
    /// Creates a `PluginId` for the given plugin type.
    #[must_use]
    pub fn of<P: Plugin>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: core::any::type_name::<P>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of server functionality.
///
/// Plugins follow a strict lifecycle managed by the server:
///
/// 1. **Build Phase** - `build()` is called in dependency order
/// 2. **Ready Phase** - `ready()` is called in dependency order
/// 3. **Cleanup Phase** - `cleanup()` is called in reverse dependency order
///
/// Registries follow a two-phase pattern: a plugin inserts a mutable registry
/// with [`Server::insert_resource`] during `build()`, dependent plugins populate
/// it during their own `build()`, and the owner freezes it into a global with
/// [`Server::insert_global`] during `ready()`.
pub trait Plugin: Send + Sync + 'static {
    /// Configures the server. Called once, in dependency order.
    fn build(&self, server: &mut Server);

    /// Called after every plugin has been built.
    ///
    /// Use this to freeze registries and validate that required resources exist.
    fn ready(&self, _server: &mut Server) {}

    /// Called when the server is shutting down, in reverse dependency order.
    fn cleanup(&self, _server: &mut Server) {}

    /// Returns the plugin's name for debugging and error messages.
    ///
    /// Default implementation returns the type name.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Declares plugins that must be added before this one.
    ///
    /// The server panics in [`Server::finish`] if a dependency is missing.
    fn dependencies(&self) -> Vec<PluginId> {
        Vec::new()
    }

    /// Returns true if this plugin can only be added once.
    fn is_unique(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugins Trait (for add_plugins polymorphism)
// ─────────────────────────────────────────────────────────────────────────────

/// Types that can be added to a server as plugins.
///
/// Implemented for every [`Plugin`] and for [`PluginGroupBuilder`].
pub trait Plugins {
    /// Adds these plugins to the server.
    fn add_to_server(self, server: &mut Server);
}

impl<P: Plugin> Plugins for P {
    fn add_to_server(self, server: &mut Server) {
        let id = PluginId::of::<P>();
        server.add_plugin_boxed(id, Box::new(self));
    }
}

impl Plugins for PluginGroupBuilder {
    fn add_to_server(self, server: &mut Server) {
        for boxed in self.plugins {
            server.add_plugin_boxed(boxed.id, boxed.plugin);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginGroup
// ─────────────────────────────────────────────────────────────────────────────

/// A collection of plugins that can be added together.
pub trait PluginGroup {
    /// Returns the plugins in this group.
    fn build(self) -> PluginGroupBuilder;
}

/// A boxed plugin with its captured [`PluginId`].
pub(crate) struct BoxedPlugin {
    pub(crate) id: PluginId,
    pub(crate) plugin: Box<dyn Plugin>,
}

/// Builder for customizing plugin groups.
///
/// ```ignore
/// DefaultPlugins
///     .build()
///     .disable::<TracingPlugin>()
///     .add(CustomTracingPlugin::new())
/// ```
#[derive(Default)]
pub struct PluginGroupBuilder {
    pub(crate) plugins: Vec<BoxedPlugin>,
}

impl PluginGroupBuilder {
    /// Creates a new empty plugin group builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Adds a plugin to the end of the group.
    #[must_use]
    #[expect(
        clippy::should_implement_trait,
        reason = "This is a builder method, not std::ops::Add"
    )]
    pub fn add<P: Plugin>(mut self, plugin: P) -> Self {
        self.plugins.push(BoxedPlugin {
            id: PluginId::of::<P>(),
            plugin: Box::new(plugin),
        });
        self
    }

    /// Replaces the plugin of type `P` in place, or appends it if absent.
    #[must_use]
    pub fn set<P: Plugin>(mut self, plugin: P) -> Self {
        let id = PluginId::of::<P>();
        let boxed = BoxedPlugin {
            id,
            plugin: Box::new(plugin),
        };
        match self.plugins.iter().position(|p| p.id == id) {
            Some(position) => self.plugins[position] = boxed,
            None => self.plugins.push(boxed),
        }
        self
    }

    /// Removes a plugin from the group by type. No-op if absent.
    #[must_use]
    pub fn disable<P: Plugin>(mut self) -> Self {
        let id = PluginId::of::<P>();
        self.plugins.retain(|p| p.id != id);
        self
    }

    /// Returns the number of plugins in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if the group contains no plugins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
