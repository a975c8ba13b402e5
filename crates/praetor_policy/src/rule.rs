//! The policy rule record and execution modes.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::JsonMap;
use crate::error::PolicyError;
use crate::schema::CompiledSchemas;
use crate::uri::PolicyRuleUri;

// ─────────────────────────────────────────────────────────────────────────────
// Execution types and modes
// ─────────────────────────────────────────────────────────────────────────────

/// How a rule was authored to run, as declared at onboarding.
///
/// Serialized as its numeric code (`1`..=`5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ExecutionType {
    /// In-process evaluation.
    Local = 1,
    /// Stateless remote evaluation; the instance is evicted after one call.
    Stateless = 2,
    /// One-shot job.
    Job = 3,
    /// Long-lived, stateful function.
    Function = 4,
    /// Node of a graph of functions.
    Graph = 5,
}

impl ExecutionType {
    /// Returns `true` for types whose context must persist across calls.
    #[must_use]
    pub fn is_stateful(self) -> bool {
        matches!(self, Self::Function | Self::Graph)
    }

    /// Returns whether a rule of this type may run in `mode`.
    ///
    /// Stateless types run locally, remotely, or as jobs. Stateful types run
    /// locally, as functions, or as graph nodes. Local execution is always
    /// allowed.
    #[must_use]
    pub fn allows(self, mode: ExecutionMode) -> bool {
        match mode {
            ExecutionMode::Local => true,
            ExecutionMode::Remote | ExecutionMode::Job => !self.is_stateful(),
            ExecutionMode::Function | ExecutionMode::Graph => self.is_stateful(),
        }
    }
}

impl TryFrom<u8> for ExecutionType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Local),
            2 => Ok(Self::Stateless),
            3 => Ok(Self::Job),
            4 => Ok(Self::Function),
            5 => Ok(Self::Graph),
            other => Err(format!("unknown execution type {other}")),
        }
    }
}

impl From<ExecutionType> for u8 {
    fn from(value: ExecutionType) -> Self {
        value as u8
    }
}

/// How a caller asked for a request to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// In the caller's process.
    Local,
    /// Proxied to a remote executor.
    Remote,
    /// Submitted as a one-shot job.
    Job,
    /// Invoked on a deployed function.
    Function,
    /// Run as a graph of functions.
    Graph,
}

impl ExecutionMode {
    /// Modes in which no state may cross invocations.
    #[must_use]
    pub fn is_stateless(self) -> bool {
        matches!(self, Self::Remote | Self::Job)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Job => "job",
            Self::Function => "function",
            Self::Graph => "graph",
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schemas
// ─────────────────────────────────────────────────────────────────────────────

/// The four JSON schemas every rule declares.
///
/// A missing (`null`) schema accepts any document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySchemas {
    /// Schema for evaluation input.
    pub input: Value,
    /// Schema for evaluation output.
    pub output: Value,
    /// Schema for construction settings.
    pub settings: Value,
    /// Schema for parameters.
    pub parameters: Value,
}

/// A named management action and the schema of its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementCommand {
    /// Action name, e.g. `update_local_allowlist`.
    pub name: String,
    /// Schema for the action's `data` argument.
    #[serde(default)]
    pub schema: Value,
}

impl ManagementCommand {
    /// Creates a command definition.
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PolicyRule
// ─────────────────────────────────────────────────────────────────────────────

/// An onboarded, immutable policy rule.
///
/// # Example
///
/// ```
/// use praetor_policy::{ExecutionType, ManagementCommand, PolicyRule};
/// use serde_json::json;
///
/// let rule = PolicyRule::new("ip-allowlist", "1.0", "stable", "bundle://allowlist", ExecutionType::Function)
///     .unwrap()
///     .with_input_schema(json!({"type": "object", "required": ["ip"]}))
///     .with_default_parameters(json!({"allowlist": []}).as_object().cloned().unwrap())
///     .with_management_command(ManagementCommand::new("update_local_allowlist", json!({"type": "array"})));
///
/// assert_eq!(rule.uri().to_string(), "ip-allowlist:1.0-stable");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    uri: PolicyRuleUri,
    /// Reference into the code store.
    pub code_uri: String,
    /// Declared execution type.
    #[serde(rename = "type")]
    pub execution_type: ExecutionType,
    /// Boundary schemas.
    #[serde(default)]
    pub schemas: PolicySchemas,
    /// Declared management actions.
    #[serde(default)]
    pub management_commands: Vec<ManagementCommand>,
    /// Settings used when no override is given.
    #[serde(default)]
    pub default_settings: JsonMap,
    /// Parameters used when no override is given.
    #[serde(default)]
    pub default_parameters: JsonMap,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: JsonMap,
}

impl PolicyRule {
    /// Creates a rule with permissive schemas and empty defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidUri`] if the identifier parts are invalid.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release_tag: impl Into<String>,
        code_uri: impl Into<String>,
        execution_type: ExecutionType,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            uri: PolicyRuleUri::new(name, version, release_tag)?,
            code_uri: code_uri.into(),
            execution_type,
            schemas: PolicySchemas::default(),
            management_commands: Vec::new(),
            default_settings: JsonMap::new(),
            default_parameters: JsonMap::new(),
            description: String::new(),
            tags: Vec::new(),
            metadata: JsonMap::new(),
        })
    }

    /// The derived `policy_rule_uri`.
    #[must_use]
    pub fn uri(&self) -> &PolicyRuleUri {
        &self.uri
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.schemas.input = schema;
        self
    }

    /// Sets the output schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.schemas.output = schema;
        self
    }

    /// Sets the settings schema.
    #[must_use]
    pub fn with_settings_schema(mut self, schema: Value) -> Self {
        self.schemas.settings = schema;
        self
    }

    /// Sets the parameters schema.
    #[must_use]
    pub fn with_parameters_schema(mut self, schema: Value) -> Self {
        self.schemas.parameters = schema;
        self
    }

    /// Sets the default settings.
    #[must_use]
    pub fn with_default_settings(mut self, settings: JsonMap) -> Self {
        self.default_settings = settings;
        self
    }

    /// Sets the default parameters.
    #[must_use]
    pub fn with_default_parameters(mut self, parameters: JsonMap) -> Self {
        self.default_parameters = parameters;
        self
    }

    /// Declares a management command.
    #[must_use]
    pub fn with_management_command(mut self, command: ManagementCommand) -> Self {
        self.management_commands.push(command);
        self
    }

    /// Adds a search tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Looks up a declared management command.
    #[must_use]
    pub fn command(&self, action: &str) -> Option<&ManagementCommand> {
        self.management_commands.iter().find(|c| c.name == action)
    }

    /// Compiles every declared schema.
    ///
    /// Defaults are not checked here: a settings schema may require keys that
    /// only callers supply. The merged values are validated at load time.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidSchema`] for a schema that does not compile.
    pub fn compile(&self) -> Result<CompiledSchemas, PolicyError> {
        CompiledSchemas::compile(self)
    }

    /// JSON projection used by query filters; includes the derived uri parts.
    #[must_use]
    pub fn projection(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("name".into(), Value::String(self.uri.name().to_string()));
            map.insert(
                "version".into(),
                Value::String(self.uri.version().to_string()),
            );
            map.insert(
                "release_tag".into(),
                Value::String(self.uri.release_tag().to_string()),
            );
        }
        value
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Overrides
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-supplied settings and parameters for one instantiation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    /// Settings override, merged key-wise onto the rule's defaults.
    pub settings: Option<JsonMap>,
    /// Parameters override, merged key-wise onto the rule's defaults.
    pub parameters: Option<JsonMap>,
}

impl Overrides {
    /// No overrides.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the settings override.
    #[must_use]
    pub fn with_settings(mut self, settings: JsonMap) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets the parameters override.
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonMap) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Merges `overrides` onto `defaults`: an overridden key wins, every other
/// key keeps its declared value. The merge is shallow.
#[must_use]
pub fn merge_overrides(defaults: &JsonMap, overrides: Option<&JsonMap>) -> JsonMap {
    let mut merged = defaults.clone();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn execution_type_round_trips_as_number() {
        let json = serde_json::to_value(ExecutionType::Function).unwrap();
        assert_eq!(json, json!(4));
        assert!(serde_json::from_value::<ExecutionType>(json!(9)).is_err());
    }

    #[test]
    fn stateful_types_reject_remote_and_job() {
        assert!(!ExecutionType::Function.allows(ExecutionMode::Remote));
        assert!(!ExecutionType::Graph.allows(ExecutionMode::Job));
        assert!(ExecutionType::Graph.allows(ExecutionMode::Function));
        assert!(ExecutionType::Stateless.allows(ExecutionMode::Remote));
        assert!(!ExecutionType::Stateless.allows(ExecutionMode::Function));
        assert!(ExecutionType::Job.allows(ExecutionMode::Local));
    }

    #[test]
    fn override_wins_per_key() {
        let defaults = obj(json!({"threshold": 5, "mode": "strict"}));
        let merged = merge_overrides(&defaults, Some(&obj(json!({"threshold": 9}))));
        assert_eq!(Value::Object(merged), json!({"threshold": 9, "mode": "strict"}));
        assert_eq!(merge_overrides(&defaults, None), defaults);
    }

    #[test]
    fn projection_exposes_uri_parts() {
        let rule = PolicyRule::new("geo", "3", "beta", "bundle://geo", ExecutionType::Stateless)
            .unwrap()
            .with_tag("network");
        let projection = rule.projection();
        assert_eq!(projection["name"], json!("geo"));
        assert_eq!(projection["uri"], json!("geo:3-beta"));
        assert_eq!(projection["type"], json!(2));
        assert_eq!(projection["tags"], json!(["network"]));
    }

    #[test]
    fn compile_rejects_broken_schema() {
        let rule = PolicyRule::new("geo", "3", "beta", "bundle://geo", ExecutionType::Local)
            .unwrap()
            .with_output_schema(json!({"type": "no-such-type"}));
        assert!(matches!(
            rule.compile(),
            Err(PolicyError::InvalidSchema {
                target: crate::SchemaTarget::Output,
                ..
            })
        ));
    }
}
