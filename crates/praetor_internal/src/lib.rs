//! # Praetor Internal Library
//!
//! Re-exports the core Praetor crates for convenience.

/// Layer 1: plugin orchestration.
pub use praetor_system;

/// Layer 1: configuration and structured logging.
pub use praetor_core_plugins;

/// Layer 2: policy rules, instances, and loading.
pub use praetor_policy;

/// Layer 2: remote executors and allocation.
pub use praetor_executors;

/// Layer 2: DAG scheduling.
pub use praetor_graph;

/// Layer 3: execution mode dispatch.
pub use praetor_runtime;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use praetor_core_plugins::{ConfigPlugin, DefaultPlugins, RuntimeConfig, TracingPlugin};
    pub use praetor_executors::{
        ExecutorRegistry, ExecutorStatus, ExecutorsPlugin, PolicyExecutor,
    };
    pub use praetor_graph::{GraphExecutor, GraphOutcome, GraphPlugin, GraphSpec};
    pub use praetor_policy::prelude::*;
    pub use praetor_runtime::{
        DispatchError, Dispatcher, ErrorKind, ExecutionRequest, ExecutionResponse,
        FunctionDeployment, JobStatus, ManageRequest, RuntimePlugin,
    };
    pub use praetor_system::prelude::*;
}
