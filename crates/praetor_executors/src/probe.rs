//! Out-of-band health probing.

use async_trait::async_trait;

use crate::executor::{ExecutorStatus, PolicyExecutor};

/// Checks the health of one executor.
///
/// Probes run outside the dispatch path; the registry records their answers
/// as advisory status.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns the executor's current status.
    async fn probe(&self, executor: &PolicyExecutor) -> ExecutorStatus;
}

/// Outcome of one probe sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// `(executor_id, new_status)` for every executor probed, in registry order.
    pub statuses: Vec<(String, ExecutorStatus)>,
    /// Executors whose probe exceeded the window.
    pub timed_out: Vec<String>,
}

impl ProbeReport {
    /// Number of executors reported healthy.
    #[must_use]
    pub fn healthy(&self) -> usize {
        self.statuses
            .iter()
            .filter(|(_, status)| status.is_healthy())
            .count()
    }
}
