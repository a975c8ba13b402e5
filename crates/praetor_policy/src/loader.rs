//! Resolves rules to constructed, cached instances.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use praetor_system::resource::GlobalResource;
use tokio::sync::OnceCell;

use crate::code::{CodeStore, ConstructRegistry};
use crate::error::PolicyError;
use crate::instance::{InstanceKey, PolicyInstance, instance_rule_id, validate_effective};
use crate::rule::{ExecutionMode, Overrides, PolicyRule, merge_overrides};
use crate::schema::CompiledSchemas;
use crate::store::PolicyStore;
use crate::uri::PolicyRuleUri;
use crate::JsonMap;

/// Loads policy instances and caches them by [`InstanceKey`].
///
/// Compiled schemas are cached per rule; rules are immutable once onboarded,
/// so the compiled form never goes stale.
pub struct PolicyLoader {
    store: Arc<dyn PolicyStore>,
    code: Arc<dyn CodeStore>,
    constructs: Arc<ConstructRegistry>,
    compiled: RwLock<HashMap<PolicyRuleUri, Arc<CompiledSchemas>>>,
    instances: Mutex<HashMap<InstanceKey, Slot>>,
}

/// Constructed at most once; concurrent first loads of a key share it.
type Slot = Arc<OnceCell<Arc<PolicyInstance>>>;

impl GlobalResource for PolicyLoader {}

impl core::fmt::Debug for PolicyLoader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolicyLoader")
            .field("constructs", &self.constructs)
            .field("cached_instances", &self.cached_len())
            .finish_non_exhaustive()
    }
}

/// A rule resolved and validated for one instantiation, not yet constructed.
struct Prepared {
    rule: Arc<PolicyRule>,
    schemas: Arc<CompiledSchemas>,
    settings: JsonMap,
    parameters: JsonMap,
    key: InstanceKey,
}

impl PolicyLoader {
    /// Creates a loader over the given stores and construct registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn PolicyStore>,
        code: Arc<dyn CodeStore>,
        constructs: Arc<ConstructRegistry>,
    ) -> Self {
        Self {
            store,
            code,
            constructs,
            compiled: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// The rule store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    /// Fetches a rule from the store.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::NotFound`] for an unknown uri.
    pub async fn rule(&self, uri: &PolicyRuleUri) -> Result<Arc<PolicyRule>, PolicyError> {
        self.store.get(uri).await
    }

    /// Loads an instance, reusing the cached one when the key matches.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::NotFound`] if the rule does not exist
    /// - [`PolicyError::Validation`] if merged settings or parameters violate
    ///   their schemas
    /// - [`PolicyError::CodeResolution`] if the bundle cannot be resolved
    /// - [`PolicyError::Execution`] if the construct refuses to build
    pub async fn load(
        &self,
        uri: &PolicyRuleUri,
        mode: ExecutionMode,
        overrides: &Overrides,
        target: Option<&str>,
    ) -> Result<Arc<PolicyInstance>, PolicyError> {
        let prepared = self.prepare(uri, mode, overrides, target).await?;
        let key = prepared.key.clone();

        let slot = Arc::clone(self.instances.lock().entry(key.clone()).or_default());
        if let Some(existing) = slot.get() {
            tracing::debug!(instance = %key, "instance cache hit");
            return Ok(Arc::clone(existing));
        }

        let result = slot
            .get_or_try_init(|| async move { self.construct(prepared).await.map(Arc::new) })
            .await
            .map(Arc::clone);
        if result.is_err() {
            let mut instances = self.instances.lock();
            if instances
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &slot) && !current.initialized())
            {
                instances.remove(&key);
            }
        }
        result
    }

    /// Loads a new instance without consulting or filling the cache.
    ///
    /// Used for stateless execution, where no state may cross invocations.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub async fn load_fresh(
        &self,
        uri: &PolicyRuleUri,
        mode: ExecutionMode,
        overrides: &Overrides,
        target: Option<&str>,
    ) -> Result<PolicyInstance, PolicyError> {
        let prepared = self.prepare(uri, mode, overrides, target).await?;
        self.construct(prepared).await
    }

    /// Returns the cached instance for `key`, if any.
    #[must_use]
    pub fn cached(&self, key: &InstanceKey) -> Option<Arc<PolicyInstance>> {
        self.instances
            .lock()
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    /// Evicts one instance. Callers holding its `Arc` keep a working handle.
    pub fn evict(&self, key: &InstanceKey) -> Option<Arc<PolicyInstance>> {
        let evicted = self
            .instances
            .lock()
            .remove(key)
            .and_then(|slot| slot.get().cloned());
        if evicted.is_some() {
            tracing::debug!(instance = %key, "instance evicted");
        }
        evicted
    }

    /// Evicts every instance of a rule, returning how many were removed.
    pub fn evict_rule(&self, uri: &PolicyRuleUri) -> usize {
        self.evict_matching(|key| &key.uri == uri)
    }

    /// Evicts every instance bound to `target`, returning how many were removed.
    pub fn evict_target(&self, target: &str) -> usize {
        self.evict_matching(|key| key.target.as_deref() == Some(target))
    }

    fn evict_matching(&self, predicate: impl Fn(&InstanceKey) -> bool) -> usize {
        let mut instances = self.instances.lock();
        let before = instances.len();
        instances.retain(|key, slot| !(slot.initialized() && predicate(key)));
        before - instances.len()
    }

    /// Number of cached instances.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.instances
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    async fn prepare(
        &self,
        uri: &PolicyRuleUri,
        mode: ExecutionMode,
        overrides: &Overrides,
        target: Option<&str>,
    ) -> Result<Prepared, PolicyError> {
        let rule = self.store.get(uri).await?;
        let schemas = self.schemas_for(&rule)?;

        let settings = merge_overrides(&rule.default_settings, overrides.settings.as_ref());
        let parameters = merge_overrides(&rule.default_parameters, overrides.parameters.as_ref());
        validate_effective(&schemas, &settings, &parameters)?;

        let key = InstanceKey::new(
            uri.clone(),
            mode,
            &settings,
            &parameters,
            target.map(ToString::to_string),
        );
        Ok(Prepared {
            rule,
            schemas,
            settings,
            parameters,
            key,
        })
    }

    fn schemas_for(&self, rule: &PolicyRule) -> Result<Arc<CompiledSchemas>, PolicyError> {
        if let Some(compiled) = self.compiled.read().get(rule.uri()) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(rule.compile()?);
        self.compiled
            .write()
            .insert(rule.uri().clone(), Arc::clone(&compiled));
        Ok(compiled)
    }

    async fn construct(&self, prepared: Prepared) -> Result<PolicyInstance, PolicyError> {
        let Prepared {
            rule,
            schemas,
            settings,
            parameters,
            key,
        } = prepared;

        let bundle = self.code.fetch_bundle(&rule.code_uri).await?;
        let factory = self.constructs.resolve(&bundle)?;
        if !bundle.requirements.is_empty() {
            tracing::debug!(code_uri = %bundle.code_uri, requirements = ?bundle.requirements, "bundle requirements");
        }

        let rule_id = instance_rule_id(&key);
        let construct = factory
            .construct(&rule_id, &settings, &parameters)
            .map_err(|err| PolicyError::execution(&rule_id, err.0))?;

        tracing::info!(instance = %key, entrypoint = %bundle.entrypoint, "policy instance constructed");
        Ok(PolicyInstance::new(
            key, rule, schemas, construct, settings, parameters,
        ))
    }
}
