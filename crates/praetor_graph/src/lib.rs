//! DAG scheduling for Praetor (Layer 2).
//!
//! A [`GraphSpec`] names deployed functions and the edges between them.
//! [`validate_graph`] proves it is a DAG and layers it into waves;
//! [`GraphExecutor`] runs the waves against a [`NodeInvoker`]:
//!
//! - source nodes receive the graph input
//! - a node with one parent receives that parent's output
//! - a node with several parents receives `{parent_id: output, ..}`
//! - the first failure stops the run once its wave has finished
//!
//! Each run produces a [`GraphRun`] recording the waves dispatched and the
//! timing and status of every node.

mod error;
mod executor;
mod invoker;
mod plugin;
mod run;
mod spec;
mod validate;

pub use error::GraphError;
pub use executor::{GraphExecutor, GraphOutcome};
pub use invoker::{NodeFailure, NodeInvoker};
pub use plugin::GraphPlugin;
pub use run::{GraphRun, NodeRecord, NodeStatus};
pub use spec::{GraphSpec, GraphUri};
pub use validate::{GraphValidationError, ValidatedGraph, validate_graph};
