//! The rule registry contract and its in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::PolicyError;
use crate::filter::Filter;
use crate::rule::PolicyRule;
use crate::uri::PolicyRuleUri;

/// Read access to onboarded rules.
#[async_trait]
pub trait PolicyStore: Send + Sync + 'static {
    /// Fetches one rule.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NotFound`] if no rule has this uri.
    async fn get(&self, uri: &PolicyRuleUri) -> Result<Arc<PolicyRule>, PolicyError>;

    /// Returns every rule whose projection matches `filter`.
    ///
    /// # Errors
    ///
    /// Implementations backed by remote storage may fail; the in-memory
    /// store never does.
    async fn query(&self, filter: &Filter) -> Result<Vec<Arc<PolicyRule>>, PolicyError>;
}

/// Rule store backed by an insertion-ordered map.
///
/// # Example
///
/// ```
/// use praetor_policy::{ExecutionType, Filter, InMemoryPolicyStore, PolicyRule};
///
/// let store = InMemoryPolicyStore::new();
/// store
///     .register(PolicyRule::new("geo", "1", "stable", "bundle://geo", ExecutionType::Stateless).unwrap())
///     .unwrap();
///
/// assert_eq!(store.len(), 1);
/// assert_eq!(store.query_sync(&Filter::eq("name", "geo")).len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    rules: RwLock<IndexMap<PolicyRuleUri, Arc<PolicyRule>>>,
}

impl InMemoryPolicyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Onboards a rule after checking that its schemas compile.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::AlreadyRegistered`] if the uri is taken; rules are
    ///   immutable once onboarded
    /// - [`PolicyError::InvalidSchema`] if a schema does not compile
    pub fn register(&self, rule: PolicyRule) -> Result<Arc<PolicyRule>, PolicyError> {
        rule.compile()?;
        let mut rules = self.rules.write();
        if rules.contains_key(rule.uri()) {
            return Err(PolicyError::AlreadyRegistered(rule.uri().to_string()));
        }
        let rule = Arc::new(rule);
        rules.insert(rule.uri().clone(), Arc::clone(&rule));
        tracing::info!(policy_rule_uri = %rule.uri(), "policy rule onboarded");
        Ok(rule)
    }

    /// Synchronous variant of [`PolicyStore::query`].
    #[must_use]
    pub fn query_sync(&self, filter: &Filter) -> Vec<Arc<PolicyRule>> {
        self.rules
            .read()
            .values()
            .filter(|rule| filter.matches(&rule.projection()))
            .cloned()
            .collect()
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Returns `true` if no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get(&self, uri: &PolicyRuleUri) -> Result<Arc<PolicyRule>, PolicyError> {
        self.rules
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| PolicyError::NotFound(uri.to_string()))
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Arc<PolicyRule>>, PolicyError> {
        Ok(self.query_sync(filter))
    }
}
