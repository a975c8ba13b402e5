//! HTTP transport and health probe for remote executors.
//!
//! Endpoints, relative to `{executor_host_uri}{path}`:
//!
//! | Method | Path | Body | Reply |
//! |--------|------|------|-------|
//! | `POST` | `/evaluate` | [`RemoteEvaluate`] | [`RemoteReply`] |
//! | `POST` | `/manage` | [`RemoteManage`] | [`RemoteReply`] |
//! | `GET` | `/health` | | `{"status": "healthy" \| "busy" \| ..}` |

use core::time::Duration;

use async_trait::async_trait;
use praetor_core_plugins::RuntimeConfig;
use praetor_executors::{ExecutorStatus, HealthProbe, PolicyExecutor};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;
use crate::remote::{RemoteEvaluate, RemoteManage, RemoteReply, RemoteTransport};

fn endpoint(executor: &PolicyExecutor, path: &str, operation: &str) -> String {
    let host = executor.executor_host_uri.trim_end_matches('/');
    let path = path.trim_matches('/');
    if path.is_empty() {
        format!("{host}/{operation}")
    } else {
        format!("{host}/{path}/{operation}")
    }
}

/// Posts remote calls as JSON with a per-call deadline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    path: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport using `path` as the endpoint prefix.
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            path: path.into(),
            timeout,
        }
    }

    /// Creates a transport from the runtime configuration.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.executor_http_path.clone(), config.remote_timeout())
    }

    async fn post<T: Serialize + Sync>(
        &self,
        executor: &PolicyExecutor,
        operation: &str,
        body: &T,
    ) -> Result<Value, DispatchError> {
        let url = endpoint(executor, &self.path, operation);
        let unavailable = |reason: String| DispatchError::unavailable(&executor.executor_id, reason);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|err| unavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| unavailable(err.to_string()))?;

        match serde_json::from_str::<RemoteReply>(&body) {
            Ok(reply) => reply.into_result(),
            Err(_) if !status.is_success() => Err(unavailable(format!("HTTP {status}: {body}"))),
            Err(err) => Err(unavailable(format!("malformed reply: {err}"))),
        }
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn evaluate(
        &self,
        executor: &PolicyExecutor,
        request: &RemoteEvaluate,
    ) -> Result<Value, DispatchError> {
        self.post(executor, "evaluate", request).await
    }

    async fn manage(
        &self,
        executor: &PolicyExecutor,
        request: &RemoteManage,
    ) -> Result<Value, DispatchError> {
        self.post(executor, "manage", request).await
    }
}

#[derive(Deserialize)]
struct HealthBody {
    status: Option<ExecutorStatus>,
}

/// Probes `GET {host}{path}/health`.
///
/// A success reply reports the status in its body, or healthy when the body
/// names none. `429` and `503` read as busy, other errors as degraded, and no
/// answer as unreachable.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    path: String,
}

impl HttpHealthProbe {
    /// Creates a probe using `path` as the endpoint prefix.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, executor: &PolicyExecutor) -> ExecutorStatus {
        let url = endpoint(executor, &self.path, "health");
        let Ok(response) = self.client.get(&url).send().await else {
            return ExecutorStatus::Unreachable;
        };
        match response.status() {
            status if status.is_success() => response
                .json::<HealthBody>()
                .await
                .ok()
                .and_then(|body| body.status)
                .unwrap_or(ExecutorStatus::Healthy),
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => ExecutorStatus::Busy,
            _ => ExecutorStatus::Degraded,
        }
    }
}
