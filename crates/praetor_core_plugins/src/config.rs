//! Runtime configuration plugin.
//!
//! [`ConfigPlugin`] installs a [`RuntimeConfig`] global. Values come from, in
//! increasing precedence: built-in defaults, an optional JSON document, and
//! `PRAETOR_*` environment variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PRAETOR_GRAPH_TIMEOUT_MS` | [`RuntimeConfig::graph_timeout_ms`] |
//! | `PRAETOR_REMOTE_TIMEOUT_MS` | [`RuntimeConfig::remote_timeout_ms`] |
//! | `PRAETOR_PROBE_WINDOW_MS` | [`RuntimeConfig::probe_window_ms`] |
//! | `PRAETOR_MAX_WAVE_CONCURRENCY` | [`RuntimeConfig::max_wave_concurrency`] |
//! | `PRAETOR_ACCEPT_DEGRADED` | [`RuntimeConfig::accept_degraded_executors`] |
//! | `PRAETOR_EXECUTOR_PATH` | [`RuntimeConfig::executor_http_path`] |
//! | `PRAETOR_LOG` | [`RuntimeConfig::log_filter`] |

use core::time::Duration;

use praetor_system::plugin::Plugin;
use praetor_system::resource::GlobalResource;
use praetor_system::server::Server;
use serde::{Deserialize, Serialize};

/// Errors produced while assembling a [`RuntimeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value of the wrong shape.
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The JSON document could not be parsed.
    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Process-wide runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deadline for a whole graph run, in milliseconds. `0` disables it.
    pub graph_timeout_ms: u64,
    /// Deadline for one remote executor call, in milliseconds.
    pub remote_timeout_ms: u64,
    /// Upper bound on a single health probe, in milliseconds.
    pub probe_window_ms: u64,
    /// Maximum number of graph nodes dispatched at once. `0` is unbounded.
    pub max_wave_concurrency: usize,
    /// Whether explicitly named executors may be used while not healthy.
    pub accept_degraded_executors: bool,
    /// Path prefix for the remote executor endpoints.
    pub executor_http_path: String,
    /// Optional tracing filter directive (e.g. `praetor=debug`).
    pub log_filter: Option<String>,
}

impl GlobalResource for RuntimeConfig {}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            graph_timeout_ms: 30_000,
            remote_timeout_ms: 10_000,
            probe_window_ms: 500,
            max_wave_concurrency: 0,
            accept_degraded_executors: false,
            executor_http_path: "/v1".to_string(),
            log_filter: None,
        }
    }
}

impl RuntimeConfig {
    /// Parses a (possibly partial) JSON document over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] if the document is malformed.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Returns the defaults overlaid with `PRAETOR_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|var| std::env::var(var).ok())
    }

    /// Overlays values produced by `lookup` onto `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn overlay(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse<T: core::str::FromStr>(
            var: &'static str,
            value: String,
        ) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var, value })
        }

        if let Some(value) = lookup("PRAETOR_GRAPH_TIMEOUT_MS") {
            self.graph_timeout_ms = parse("PRAETOR_GRAPH_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("PRAETOR_REMOTE_TIMEOUT_MS") {
            self.remote_timeout_ms = parse("PRAETOR_REMOTE_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("PRAETOR_PROBE_WINDOW_MS") {
            self.probe_window_ms = parse("PRAETOR_PROBE_WINDOW_MS", value)?;
        }
        if let Some(value) = lookup("PRAETOR_MAX_WAVE_CONCURRENCY") {
            self.max_wave_concurrency = parse("PRAETOR_MAX_WAVE_CONCURRENCY", value)?;
        }
        if let Some(value) = lookup("PRAETOR_ACCEPT_DEGRADED") {
            self.accept_degraded_executors = parse("PRAETOR_ACCEPT_DEGRADED", value)?;
        }
        if let Some(value) = lookup("PRAETOR_EXECUTOR_PATH") {
            self.executor_http_path = value;
        }
        if let Some(value) = lookup("PRAETOR_LOG") {
            self.log_filter = Some(value);
        }
        Ok(self)
    }

    /// Sets the graph run deadline.
    #[must_use]
    pub fn with_graph_timeout(mut self, timeout: Duration) -> Self {
        self.graph_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// Sets the remote call deadline.
    #[must_use]
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// Sets the health probe window.
    #[must_use]
    pub fn with_probe_window(mut self, window: Duration) -> Self {
        self.probe_window_ms = duration_to_ms(window);
        self
    }

    /// Sets the per-wave concurrency cap.
    #[must_use]
    pub fn with_max_wave_concurrency(mut self, max: usize) -> Self {
        self.max_wave_concurrency = max;
        self
    }

    /// Graph run deadline, or `None` when disabled.
    #[must_use]
    pub fn graph_timeout(&self) -> Option<Duration> {
        (self.graph_timeout_ms > 0).then(|| Duration::from_millis(self.graph_timeout_ms))
    }

    /// Remote call deadline.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Health probe window.
    #[must_use]
    pub fn probe_window(&self) -> Duration {
        Duration::from_millis(self.probe_window_ms)
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Installs [`RuntimeConfig`] as a global resource.
///
/// # Example
///
/// ```
/// use core::time::Duration;
/// use praetor_system::server::Server;
/// use praetor_core_plugins::{ConfigPlugin, RuntimeConfig};
///
/// let mut server = Server::new();
/// server.add_plugins(ConfigPlugin::new(
///     RuntimeConfig::default().with_graph_timeout(Duration::from_secs(5)),
/// ));
/// server.finish();
///
/// let config = server.global::<RuntimeConfig>().unwrap();
/// assert_eq!(config.graph_timeout_ms, 5_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigPlugin {
    config: RuntimeConfig,
}

impl ConfigPlugin {
    /// Creates the plugin with an explicit configuration.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Creates the plugin from `PRAETOR_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        RuntimeConfig::from_env().map(Self::new)
    }
}

impl Plugin for ConfigPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_global(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{"probe_window_ms": 50}"#).unwrap();
        assert_eq!(config.probe_window_ms, 50);
        assert_eq!(config.remote_timeout_ms, 10_000);
        assert_eq!(config.executor_http_path, "/v1");
    }

    #[test]
    fn overlay_reads_variables() {
        let config = RuntimeConfig::default()
            .overlay(|var| match var {
                "PRAETOR_GRAPH_TIMEOUT_MS" => Some("0".into()),
                "PRAETOR_ACCEPT_DEGRADED" => Some("true".into()),
                "PRAETOR_LOG" => Some("praetor=debug".into()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.graph_timeout(), None);
        assert!(config.accept_degraded_executors);
        assert_eq!(config.log_filter.as_deref(), Some("praetor=debug"));
    }

    #[test]
    fn overlay_rejects_garbage() {
        let err = RuntimeConfig::default()
            .overlay(|var| (var == "PRAETOR_PROBE_WINDOW_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "PRAETOR_PROBE_WINDOW_MS",
                ..
            }
        ));
    }

    #[test]
    fn plugin_installs_global() {
        let mut server = Server::new();
        server.add_plugins(ConfigPlugin::default());
        server.finish();
        assert!(server.contains_global::<RuntimeConfig>());
    }
}
