//! Structured logging plugin.
//!
//! [`TracingPlugin`] publishes a [`TracingConfig`] global during `build()` and
//! installs the `tracing` subscriber during `ready()`, after every other plugin
//! had a chance to adjust [`RuntimeConfig`].
//!
//! Filter precedence, first match wins:
//!
//! 1. [`TracingPlugin::with_env_filter`]
//! 2. [`RuntimeConfig::log_filter`] (`PRAETOR_LOG`)
//! 3. [`TracingPlugin::with_level`], applied to every target
//!
//! # Example
//!
//! ```
//! use praetor_system::server::Server;
//! use praetor_core_plugins::{ConfigPlugin, TracingFormat, TracingPlugin};
//! use tracing::Level;
//!
//! let mut server = Server::new();
//! server
//!     .add_plugins(ConfigPlugin::default())
//!     .add_plugins(
//!         TracingPlugin::default()
//!             .with_level(Level::DEBUG)
//!             .with_format(TracingFormat::Compact),
//!     );
//! server.finish();
//! ```

use praetor_system::plugin::{Plugin, PluginId};
use praetor_system::resource::GlobalResource;
use praetor_system::server::Server;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{ConfigPlugin, RuntimeConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line, human-readable output.
    #[default]
    Pretty,
    /// Single-line output.
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

/// The effective logging configuration, readable by any plugin or handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Fallback level when no filter directive is configured.
    pub level: Level,
    /// Output format.
    pub format: TracingFormat,
    /// The filter directive the subscriber was installed with.
    pub filter: String,
}

impl GlobalResource for TracingConfig {}

/// Installs the global `tracing` subscriber.
///
/// # Resources Provided
///
/// | Resource | Scope | Description |
/// |----------|-------|-------------|
/// | [`TracingConfig`] | Global | Effective logging configuration |
///
/// # Dependencies
///
/// - [`ConfigPlugin`]
#[derive(Debug, Clone)]
pub struct TracingPlugin {
    level: Level,
    format: TracingFormat,
    env_filter: Option<String>,
    span_events: bool,
}

impl Default for TracingPlugin {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingPlugin {
    /// Creates a plugin logging at `INFO` in the pretty format.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets an explicit filter directive, e.g. `praetor_graph=debug,reqwest=warn`.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Emits span enter/exit events (useful when following graph waves).
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Resolves the filter directive against the runtime configuration.
    fn resolve_filter(&self, config: Option<&RuntimeConfig>) -> String {
        self.env_filter
            .clone()
            .or_else(|| config.and_then(|c| c.log_filter.clone()))
            .unwrap_or_else(|| self.level.as_str().to_ascii_lowercase())
    }
}

impl Plugin for TracingPlugin {
    fn build(&self, server: &mut Server) {
        let config = server.global::<RuntimeConfig>();
        server.insert_global(TracingConfig {
            level: self.level,
            format: self.format,
            filter: self.resolve_filter(config.as_deref()),
        });
    }

    fn ready(&self, server: &mut Server) {
        let Some(config) = server.global::<TracingConfig>() else {
            return;
        };

        let env_filter = EnvFilter::try_new(&config.filter)
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        // try_init fails when a subscriber is already installed (tests, embedders).
        let registry = tracing_subscriber::registry().with(env_filter);
        let installed = match self.format {
            TracingFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_span_events(span_events),
                )
                .try_init(),
            TracingFormat::Compact => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_span_events(span_events),
                )
                .try_init(),
            TracingFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(span_events),
                )
                .try_init(),
        };

        tracing::info!(
            filter = %config.filter,
            format = ?config.format,
            installed = installed.is_ok(),
            "tracing ready"
        );
    }

    fn cleanup(&self, _server: &mut Server) {
        tracing::info!("tracing shutting down");
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<ConfigPlugin>()]
    }
}
