//! Code bundles and the construct registry that resolves them.
//!
//! Bundles are fetched from a [`CodeStore`]; their `entrypoint` names a
//! [`PolicyFactory`] registered in the [`ConstructRegistry`]. Policy code is
//! linked into the host and registered by plugins during the build phase.

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::construct::PolicyFactory;
use crate::error::PolicyError;

/// A fetched code bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBundle {
    /// The reference the bundle was fetched by.
    pub code_uri: String,
    /// Name of the construct the bundle exposes.
    pub entrypoint: String,
    /// Declared runtime requirements (informational).
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl CodeBundle {
    /// Creates a bundle with no requirements.
    pub fn new(code_uri: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            code_uri: code_uri.into(),
            entrypoint: entrypoint.into(),
            requirements: Vec::new(),
        }
    }

    /// Adds a requirement.
    #[must_use]
    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }
}

/// Source of code bundles.
#[async_trait]
pub trait CodeStore: Send + Sync + 'static {
    /// Fetches the bundle stored under `code_uri`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::CodeResolution`] if the bundle is unavailable.
    async fn fetch_bundle(&self, code_uri: &str) -> Result<CodeBundle, PolicyError>;
}

/// Code store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryCodeStore {
    bundles: RwLock<HashMap<String, CodeBundle>>,
}

impl InMemoryCodeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a bundle under its `code_uri`, replacing any previous one.
    pub fn insert(&self, bundle: CodeBundle) {
        self.bundles.write().insert(bundle.code_uri.clone(), bundle);
    }
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn fetch_bundle(&self, code_uri: &str) -> Result<CodeBundle, PolicyError> {
        self.bundles
            .read()
            .get(code_uri)
            .cloned()
            .ok_or_else(|| PolicyError::code_resolution(code_uri, "bundle not found"))
    }
}

/// Maps bundle entrypoints to the factories that build their constructs.
#[derive(Default)]
pub struct ConstructRegistry {
    factories: HashMap<String, Arc<dyn PolicyFactory>>,
}

impl core::fmt::Debug for ConstructRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConstructRegistry")
            .field("entrypoints", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConstructRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `entrypoint`.
    ///
    /// # Panics
    ///
    /// Panics if the entrypoint is already registered; two bundles claiming
    /// one entrypoint is a wiring mistake.
    pub fn register(&mut self, entrypoint: impl Into<String>, factory: impl PolicyFactory) {
        self.register_shared(entrypoint, Arc::new(factory));
    }

    /// Registers an already shared factory under `entrypoint`.
    ///
    /// # Panics
    ///
    /// Panics if the entrypoint is already registered.
    pub fn register_shared(&mut self, entrypoint: impl Into<String>, factory: Arc<dyn PolicyFactory>) {
        let entrypoint = entrypoint.into();
        if self.factories.contains_key(&entrypoint) {
            panic!("construct entrypoint '{entrypoint}' is already registered");
        }
        self.factories.insert(entrypoint, factory);
    }

    /// Returns `true` if `entrypoint` has a factory.
    #[must_use]
    pub fn contains(&self, entrypoint: &str) -> bool {
        self.factories.contains_key(entrypoint)
    }

    /// Returns the number of registered entrypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Resolves the factory a bundle points at.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::CodeResolution`] if the entrypoint is unknown.
    pub fn resolve(&self, bundle: &CodeBundle) -> Result<Arc<dyn PolicyFactory>, PolicyError> {
        self.factories
            .get(&bundle.entrypoint)
            .cloned()
            .ok_or_else(|| {
                PolicyError::code_resolution(
                    &bundle.code_uri,
                    format!("entrypoint '{}' exposes no registered construct", bundle.entrypoint),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::PolicyConstruct;
    use crate::error::ConstructError;
    use crate::JsonMap;

    fn refusing(
        _rule_id: &str,
        _settings: &JsonMap,
        _parameters: &JsonMap,
    ) -> Result<Box<dyn PolicyConstruct>, ConstructError> {
        Err(ConstructError::new("unused"))
    }

    #[tokio::test]
    async fn missing_bundle_is_code_resolution() {
        let store = InMemoryCodeStore::new();
        let err = store.fetch_bundle("bundle://nope").await.unwrap_err();
        assert!(matches!(err, PolicyError::CodeResolution { .. }));
    }

    #[test]
    fn unknown_entrypoint_is_code_resolution() {
        let mut registry = ConstructRegistry::new();
        registry.register("allowlist", refusing);

        assert!(registry.resolve(&CodeBundle::new("bundle://a", "allowlist")).is_ok());
        let err = registry
            .resolve(&CodeBundle::new("bundle://b", "geoip"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("geoip"));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_entrypoint_panics() {
        let mut registry = ConstructRegistry::new();
        registry.register("allowlist", refusing);
        registry.register("allowlist", refusing);
    }
}
