//! The seam between the scheduler and whatever executes a node.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Why a node call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeFailure {
    /// The function ran and reported an error.
    #[error("execution failed: {0}")]
    Execution(String),
    /// The function's input or output broke its contract.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The function is not deployed, or its executor cannot be reached.
    #[error("function unavailable: {0}")]
    Unavailable(String),
}

/// Executes one graph node.
///
/// Implementations must be safe to call concurrently for different nodes of
/// the same wave.
#[async_trait]
pub trait NodeInvoker: Send + Sync {
    /// Runs `function_id` on `input` and returns its output.
    async fn invoke(&self, function_id: &str, input: Value) -> Result<Value, NodeFailure>;
}

#[async_trait]
impl<T: NodeInvoker + ?Sized> NodeInvoker for Arc<T> {
    async fn invoke(&self, function_id: &str, input: Value) -> Result<Value, NodeFailure> {
        (**self).invoke(function_id, input).await
    }
}
