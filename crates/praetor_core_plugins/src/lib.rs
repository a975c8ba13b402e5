//! Core infrastructure plugins for Praetor.
//!
//! - [`ConfigPlugin`] - Installs [`RuntimeConfig`] (defaults, JSON, `PRAETOR_*` env)
//! - [`TracingPlugin`] - Structured logging via `tracing-subscriber`
//! - [`DefaultPlugins`] - Both of the above, in dependency order
//!
//! # Example
//!
//! ```
//! use praetor_system::plugin::PluginGroup;
//! use praetor_system::server::Server;
//! use praetor_core_plugins::{DefaultPlugins, RuntimeConfig};
//!
//! let mut server = Server::new();
//! server.add_plugins(DefaultPlugins.build());
//! server.finish();
//! assert!(server.contains_global::<RuntimeConfig>());
//! ```

mod config;
mod tracing_plugin;

pub use config::{ConfigError, ConfigPlugin, RuntimeConfig};
pub use tracing_plugin::{TracingConfig, TracingFormat, TracingPlugin};

use praetor_system::plugin::{PluginGroup, PluginGroupBuilder};

/// Default ambient plugins for a Praetor server.
///
/// Swap in an environment-derived configuration with
/// `DefaultPlugins.build().set(ConfigPlugin::from_env()?)`.
pub struct DefaultPlugins;

impl PluginGroup for DefaultPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::new()
            .add(ConfigPlugin::default())
            .add(TracingPlugin::default())
    }
}

/// Configuration only, without installing a subscriber.
///
/// Suited to tests that install their own subscriber or none at all.
pub struct MinimalPlugins;

impl PluginGroup for MinimalPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::new().add(ConfigPlugin::default())
    }
}
