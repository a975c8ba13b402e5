//! Policy-driven executor selection.
//!
//! The allocator is an ordinary policy: it is evaluated with the request's
//! hints as input and the registry snapshot in its context under
//! `"executors"`, and must answer `{"executor_id": "<id>"}`.

use std::sync::Arc;

use praetor_policy::{ExecutionMode, JsonMap, Overrides, PolicyInstance, PolicyLoader, PolicyRuleUri};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::RegistryError;

/// Function id the allocator instance is cached under.
pub const ALLOCATOR_TARGET: &str = "resource-allocator";

enum Source {
    Instance(Arc<PolicyInstance>),
    Rule {
        loader: Arc<PolicyLoader>,
        uri: PolicyRuleUri,
        overrides: Overrides,
        loaded: OnceCell<Arc<PolicyInstance>>,
    },
}

/// A strategy object choosing an executor for a pending request.
pub struct ResourceAllocator {
    source: Source,
}

impl core::fmt::Debug for ResourceAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.source {
            Source::Instance(instance) => f
                .debug_tuple("ResourceAllocator")
                .field(&instance.rule_id())
                .finish(),
            Source::Rule { uri, .. } => f
                .debug_tuple("ResourceAllocator")
                .field(&uri.to_string())
                .finish(),
        }
    }
}

impl ResourceAllocator {
    /// Wraps an already loaded allocator instance.
    #[must_use]
    pub fn from_instance(instance: Arc<PolicyInstance>) -> Self {
        Self {
            source: Source::Instance(instance),
        }
    }

    /// Loads the allocator rule on first use.
    #[must_use]
    pub fn from_rule(loader: Arc<PolicyLoader>, uri: PolicyRuleUri, overrides: Overrides) -> Self {
        Self {
            source: Source::Rule {
                loader,
                uri,
                overrides,
                loaded: OnceCell::new(),
            },
        }
    }

    async fn instance(&self) -> Result<Arc<PolicyInstance>, RegistryError> {
        match &self.source {
            Source::Instance(instance) => Ok(Arc::clone(instance)),
            Source::Rule {
                loader,
                uri,
                overrides,
                loaded,
            } => loaded
                .get_or_try_init(|| async {
                    loader
                        .load(uri, ExecutionMode::Local, overrides, Some(ALLOCATOR_TARGET))
                        .await
                })
                .await
                .cloned()
                .map_err(RegistryError::Allocator),
        }
    }

    /// Asks the allocator policy for an executor id.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Allocator`] if the policy fails to load or evaluate
    /// - [`RegistryError::Allocation`] if the answer names no executor
    pub async fn allocate(&self, hints: &Value, snapshot: Value) -> Result<String, RegistryError> {
        let instance = self.instance().await?;

        let mut seed = JsonMap::new();
        seed.insert("executors".into(), snapshot);
        let output = instance
            .evaluate_with_context(hints.clone(), seed)
            .await
            .map_err(RegistryError::Allocator)?;

        match output.get("executor_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(RegistryError::allocation(format!(
                "allocator {} returned no executor_id",
                instance.rule_id()
            ))),
        }
    }
}
