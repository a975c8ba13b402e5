//! Plugin orchestration for Praetor (Layer 1).
//!
//! `praetor_system` provides the primitives every other Praetor crate builds on:
//!
//! - [`plugin`] - Plugin trait, plugin identity, and plugin groups
//! - [`resource`] - Build-phase mutable registries and frozen global resources
//! - [`server`] - Server runtime that orders and drives plugin lifecycles
//!
//! # Architecture
//!
//! - **Layer 1** (`praetor_system`, `praetor_core_plugins`): orchestration and ambient plugins
//! - **Layer 2** (`praetor_policy`, `praetor_executors`, `praetor_graph`): policy
//!   instances, executor resolution, and DAG scheduling
//! - **Layer 3** (`praetor_runtime`): execution mode dispatch and platform proxies
//!
//! # Example
//!
//! ```
//! use praetor_system::plugin::Plugin;
//! use praetor_system::server::Server;
//! use praetor_system::resource::GlobalResource;
//!
//! #[derive(Default)]
//! struct Limits { max_waves: usize }
//! impl GlobalResource for Limits {}
//!
//! struct LimitsPlugin;
//!
//! impl Plugin for LimitsPlugin {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_global(Limits::default());
//!     }
//! }
//!
//! let mut server = Server::new();
//! server.add_plugins(LimitsPlugin);
//! server.finish();
//! assert!(server.contains_global::<Limits>());
//! ```

/// Plugin trait for extensible functionality.
pub mod plugin;

/// Build-phase registries and frozen global resources.
pub mod resource;

/// Server runtime for plugin orchestration.
pub mod server;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::plugin::*;
    pub use crate::resource::*;
    pub use crate::server::*;
}
