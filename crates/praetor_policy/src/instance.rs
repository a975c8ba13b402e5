//! Loaded policy instances and their cache keys.

use core::fmt;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::JsonMap;
use crate::construct::PolicyConstruct;
use crate::error::PolicyError;
use crate::rule::{ExecutionMode, PolicyRule};
use crate::schema::CompiledSchemas;
use crate::uri::PolicyRuleUri;

// ─────────────────────────────────────────────────────────────────────────────
// InstanceKey
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a cached instance.
///
/// Two loads with equal keys share one instance; any difference, including a
/// single changed setting, produces a separate instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    /// The rule being instantiated.
    pub uri: PolicyRuleUri,
    /// The mode the instance serves.
    pub mode: ExecutionMode,
    /// SHA-256 of the effective settings.
    pub settings_fingerprint: String,
    /// SHA-256 of the effective parameters at load time.
    pub parameters_fingerprint: String,
    /// Executor or function id the instance is bound to, if any.
    pub target: Option<String>,
}

impl InstanceKey {
    /// Builds a key from effective (merged) settings and parameters.
    #[must_use]
    pub fn new(
        uri: PolicyRuleUri,
        mode: ExecutionMode,
        settings: &JsonMap,
        parameters: &JsonMap,
        target: Option<String>,
    ) -> Self {
        Self {
            uri,
            mode,
            settings_fingerprint: fingerprint(settings),
            parameters_fingerprint: fingerprint(parameters),
            target,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}[{}/{}]",
            self.uri,
            self.mode,
            &self.settings_fingerprint[..8.min(self.settings_fingerprint.len())],
            &self.parameters_fingerprint[..8.min(self.parameters_fingerprint.len())],
        )?;
        if let Some(target) = &self.target {
            write!(f, "->{target}")?;
        }
        Ok(())
    }
}

/// Hex SHA-256 over the canonical (recursively key-sorted) JSON of `map`.
#[must_use]
pub fn fingerprint(map: &JsonMap) -> String {
    let mut canonical = String::new();
    write_canonical(&Value::Object(map.clone()), &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PolicyInstance
// ─────────────────────────────────────────────────────────────────────────────

struct InstanceState {
    construct: Box<dyn PolicyConstruct>,
    parameters: JsonMap,
    context: JsonMap,
}

/// One constructed execution of a rule.
///
/// Settings are fixed at construction. Parameters change only through
/// [`manage`](Self::manage); context changes only through the construct's own
/// `evaluate`/`manage`. Calls are serialized: concurrent callers queue on an
/// async mutex instead of interleaving.
pub struct PolicyInstance {
    key: InstanceKey,
    rule_id: String,
    rule: Arc<PolicyRule>,
    schemas: Arc<CompiledSchemas>,
    settings: JsonMap,
    state: Mutex<InstanceState>,
}

impl fmt::Debug for PolicyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyInstance")
            .field("key", &self.key)
            .field("rule_id", &self.rule_id)
            .finish_non_exhaustive()
    }
}

impl PolicyInstance {
    pub(crate) fn new(
        key: InstanceKey,
        rule: Arc<PolicyRule>,
        schemas: Arc<CompiledSchemas>,
        construct: Box<dyn PolicyConstruct>,
        settings: JsonMap,
        parameters: JsonMap,
    ) -> Self {
        let rule_id = instance_rule_id(&key);
        Self {
            key,
            rule_id,
            rule,
            schemas,
            settings,
            state: Mutex::new(InstanceState {
                construct,
                parameters,
                context: JsonMap::new(),
            }),
        }
    }

    /// The cache key this instance was created under.
    #[must_use]
    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    /// The function id for function and graph instances, otherwise the rule uri.
    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// The rule this instance was constructed from.
    #[must_use]
    pub fn rule(&self) -> &Arc<PolicyRule> {
        &self.rule
    }

    /// The effective settings.
    #[must_use]
    pub fn settings(&self) -> &JsonMap {
        &self.settings
    }

    /// Validates `input`, evaluates it, and validates the result.
    ///
    /// Invalid input is rejected before the construct runs. A result that
    /// violates the output schema is returned as an error, never coerced.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::Validation`] for input or output schema violations
    /// - [`PolicyError::Execution`] if the construct fails
    pub async fn evaluate(&self, input: Value) -> Result<Value, PolicyError> {
        self.evaluate_with_context(input, JsonMap::new()).await
    }

    /// Like [`evaluate`](Self::evaluate), but first writes `seed` into the
    /// context. Seeded keys replace existing ones.
    ///
    /// The resource allocator uses this to hand the registry snapshot to its
    /// policy.
    ///
    /// # Errors
    ///
    /// Same as [`evaluate`](Self::evaluate).
    pub async fn evaluate_with_context(
        &self,
        input: Value,
        seed: JsonMap,
    ) -> Result<Value, PolicyError> {
        self.schemas.input.validate(&input)?;

        let mut state = self.state.lock().await;
        let InstanceState {
            construct,
            parameters,
            context,
        } = &mut *state;

        context.extend(seed);
        let result = construct.evaluate(parameters, input, context).await;
        if self.key.mode.is_stateless() {
            context.clear();
        }
        drop(state);

        let output = result.map_err(|err| PolicyError::execution(&self.rule_id, err.0))?;
        self.schemas.output.validate(&output)?;
        tracing::debug!(rule_id = %self.rule_id, "policy evaluated");
        Ok(output)
    }

    /// Runs a declared management action.
    ///
    /// A failing action, or one that leaves parameters non-conforming, is
    /// rolled back: parameters and context are restored and the call fails.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::UnknownAction`] if `action` is not declared by the rule
    /// - [`PolicyError::Validation`] if `data` or the resulting parameters
    ///   violate their schemas
    /// - [`PolicyError::Execution`] if the construct fails
    pub async fn manage(&self, action: &str, data: Value) -> Result<Value, PolicyError> {
        let validator = self
            .schemas
            .command(action)
            .ok_or_else(|| PolicyError::UnknownAction {
                action: action.to_string(),
                rule_id: self.rule_id.clone(),
            })?;
        validator.validate(&data)?;

        let mut state = self.state.lock().await;
        let InstanceState {
            construct,
            parameters,
            context,
        } = &mut *state;

        let previous_parameters = parameters.clone();
        let previous_context = context.clone();
        let output = match construct.manage(action, data, parameters, context).await {
            Ok(output) => output,
            Err(err) => {
                *parameters = previous_parameters;
                *context = previous_context;
                tracing::warn!(rule_id = %self.rule_id, action, "management command failed; rolled back");
                return Err(PolicyError::execution(&self.rule_id, err.0));
            }
        };

        if let Err(err) = self
            .schemas
            .parameters
            .validate(&Value::Object(parameters.clone()))
        {
            *parameters = previous_parameters;
            *context = previous_context;
            tracing::warn!(rule_id = %self.rule_id, action, "management left invalid parameters; rolled back");
            return Err(err);
        }

        tracing::info!(rule_id = %self.rule_id, action, "management command applied");
        Ok(output)
    }

    /// A copy of the current parameters.
    pub async fn parameters(&self) -> JsonMap {
        self.state.lock().await.parameters.clone()
    }

    /// A copy of the current context.
    pub async fn context_snapshot(&self) -> JsonMap {
        self.state.lock().await.context.clone()
    }

    /// Clears the context.
    pub async fn reset_context(&self) {
        self.state.lock().await.context.clear();
    }
}

pub(crate) fn instance_rule_id(key: &InstanceKey) -> String {
    match (&key.mode, &key.target) {
        (ExecutionMode::Function | ExecutionMode::Graph, Some(function_id)) => function_id.clone(),
        _ => key.uri.to_string(),
    }
}

/// Checks merged settings and parameters before anything is constructed.
pub(crate) fn validate_effective(
    schemas: &CompiledSchemas,
    settings: &JsonMap,
    parameters: &JsonMap,
) -> Result<(), PolicyError> {
    schemas.settings.validate(&Value::Object(settings.clone()))?;
    schemas.parameters.validate(&Value::Object(parameters.clone()))
}
