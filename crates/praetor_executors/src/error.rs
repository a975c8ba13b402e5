//! Error types for executor resolution.

use praetor_policy::PolicyError;
use thiserror::Error;

use crate::executor::ExecutorStatus;

/// Errors produced by the executor registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No executor is registered under the id.
    #[error("executor not found: {0}")]
    NotFound(String),

    /// The executor exists but is not healthy and degraded use was not accepted.
    #[error("executor {executor_id} is {status}")]
    NotHealthy {
        /// The requested executor.
        executor_id: String,
        /// Its last known status.
        status: ExecutorStatus,
    },

    /// An executor with the id is already registered.
    #[error("executor already registered: {0}")]
    AlreadyRegistered(String),

    /// Dynamic allocation did not produce a usable executor.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// The allocator policy itself failed.
    #[error("allocator policy failed: {0}")]
    Allocator(#[source] PolicyError),
}

impl RegistryError {
    /// Creates an [`Allocation`](Self::Allocation) error.
    pub fn allocation(reason: impl Into<String>) -> Self {
        Self::Allocation(reason.into())
    }
}
