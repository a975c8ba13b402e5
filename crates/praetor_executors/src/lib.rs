//! Remote executors: registry, resolution, allocation, and health.
//!
//! - [`ExecutorRegistry`] - known executors and request-time resolution
//! - [`ResourceAllocator`] - policy-driven selection when no executor is named
//! - [`HealthProbe`] - out-of-band status updates bounded by a probe window
//! - [`ExecutorsPlugin`] - installs the registry as a global

mod allocator;
mod error;
mod executor;
mod plugin;
mod probe;
mod registry;

pub use allocator::{ALLOCATOR_TARGET, ResourceAllocator};
pub use error::RegistryError;
pub use executor::{ExecutorStatus, PolicyExecutor};
pub use plugin::ExecutorsPlugin;
pub use probe::{HealthProbe, ProbeReport};
pub use registry::{ExecutorRegistry, ResolveOptions};
