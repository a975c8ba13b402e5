//! The executor record.

use core::fmt;

use praetor_policy::JsonMap;
use serde::{Deserialize, Serialize};

/// Last known health of an executor, as reported by out-of-band probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorStatus {
    /// Accepting work.
    Healthy,
    /// Did not answer the last probe.
    Unreachable,
    /// Answering but saturated.
    Busy,
    /// Answering with reduced capacity.
    Degraded,
    /// Never probed.
    #[default]
    Unknown,
}

impl ExecutorStatus {
    /// Returns `true` only for [`Healthy`](Self::Healthy).
    #[must_use]
    pub fn is_healthy(self) -> bool {
        self == Self::Healthy
    }
}

impl fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Unreachable => "unreachable",
            Self::Busy => "busy",
            Self::Degraded => "degraded",
            Self::Unknown => "unknown",
        })
    }
}

/// A registered remote executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyExecutor {
    /// Registry key.
    pub executor_id: String,
    /// Base URL of the executor's endpoint.
    pub executor_host_uri: String,
    /// Free-form metadata (region, owner, ...).
    #[serde(default)]
    pub executor_metadata: JsonMap,
    /// Hardware description (gpus, memory, ...).
    #[serde(default)]
    pub executor_hardware_info: JsonMap,
    /// Last known health.
    #[serde(default)]
    pub executor_status: ExecutorStatus,
}

impl PolicyExecutor {
    /// Creates a record with unknown health.
    pub fn new(executor_id: impl Into<String>, executor_host_uri: impl Into<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            executor_host_uri: executor_host_uri.into(),
            executor_metadata: JsonMap::new(),
            executor_hardware_info: JsonMap::new(),
            executor_status: ExecutorStatus::Unknown,
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: ExecutorStatus) -> Self {
        self.executor_status = status;
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: JsonMap) -> Self {
        self.executor_metadata = metadata;
        self
    }

    /// Sets the hardware description.
    #[must_use]
    pub fn with_hardware_info(mut self, hardware: JsonMap) -> Self {
        self.executor_hardware_info = hardware;
        self
    }
}
