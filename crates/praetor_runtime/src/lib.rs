//! Execution mode dispatch for Praetor (Layer 3).
//!
//! A caller picks one of five modes per request; the same rule may be run in
//! several of them, subject to its declared execution type:
//!
//! - **local**: a cached instance in this process
//! - **remote**: a fresh instance on a resolved executor, over a [`RemoteTransport`]
//! - **job**: a batch run submitted through an [`OrchestrationPlatform`], tracked by [`JobManager`]
//! - **function**: a deployed stateful instance owned by [`FunctionManager`]
//! - **graph**: a DAG of deployed functions run by a [`praetor_graph::GraphExecutor`]
//!
//! [`Dispatcher`] routes requests, and [`RuntimePlugin`] wires it up over the
//! globals installed by the lower layers. Every failure is a
//! [`DispatchError`] whose [`ErrorKind`] is stable across modes and the wire.

mod dispatcher;
mod error;
mod functions;
mod graphs;
mod http;
mod jobs;
mod mode;
mod platform;
mod plugin;
mod remote;
mod request;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, ErrorKind, ErrorReport};
pub use functions::{Function, FunctionDeployment, FunctionManager};
pub use graphs::GraphStore;
pub use http::{HttpHealthProbe, HttpTransport};
pub use jobs::{Job, JobHandle, JobManager, JobReporter, JobStatus};
pub use platform::{
    Autoscaling, DeploymentSpec, InProcessPlatform, JobSpec, OrchestrationPlatform, PlatformHandle,
};
pub use plugin::RuntimePlugin;
pub use praetor_policy::ExecutionMode;
pub use remote::{
    LoopbackTransport, RemoteEvaluate, RemoteManage, RemoteReply, RemoteTransport,
    StatelessExecutorService,
};
pub use request::{ExecutionRequest, ExecutionResponse, ManageRequest};
