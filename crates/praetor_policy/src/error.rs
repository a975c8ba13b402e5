//! Error types for policy loading and evaluation.

use core::fmt;

use thiserror::Error;

/// Which schema boundary a payload was checked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaTarget {
    /// Evaluation input.
    Input,
    /// Evaluation output.
    Output,
    /// Construction settings.
    Settings,
    /// Construction and runtime parameters.
    Parameters,
    /// Payload of the named management command.
    Management(String),
}

impl fmt::Display for SchemaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
            Self::Settings => f.write_str("settings"),
            Self::Parameters => f.write_str("parameters"),
            Self::Management(action) => write!(f, "management command '{action}'"),
        }
    }
}

/// Errors produced by policy loading, evaluation, and management.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A payload violated its schema. Never auto-corrected.
    #[error("{target} failed validation: {}", violations.join("; "))]
    Validation {
        /// The boundary that rejected the payload.
        target: SchemaTarget,
        /// One entry per violation, formatted as `instance_path: message`.
        violations: Vec<String>,
    },

    /// A rule declared a schema that does not compile.
    #[error("invalid {target} schema: {message}")]
    InvalidSchema {
        /// The schema that failed to compile.
        target: SchemaTarget,
        /// Compiler diagnostic.
        message: String,
    },

    /// No rule is registered under the uri.
    #[error("policy rule not found: {0}")]
    NotFound(String),

    /// A rule with the same uri was already onboarded.
    #[error("policy rule already registered: {0}")]
    AlreadyRegistered(String),

    /// A uri string does not have the `{name}:{version}-{release_tag}` shape.
    #[error("invalid uri '{uri}': {reason}")]
    InvalidUri {
        /// The rejected input.
        uri: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The code bundle could not be fetched or exposes no known construct.
    #[error("cannot resolve code '{code_uri}': {reason}")]
    CodeResolution {
        /// The bundle reference from the rule.
        code_uri: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The action is not one of the rule's declared management commands.
    #[error("unknown management action '{action}' for {rule_id}")]
    UnknownAction {
        /// The requested action.
        action: String,
        /// The instance it was sent to.
        rule_id: String,
    },

    /// The policy's own logic failed.
    #[error("policy {rule_id} failed: {message}")]
    Execution {
        /// The failing instance.
        rule_id: String,
        /// The construct's error message.
        message: String,
    },
}

impl PolicyError {
    /// Creates a [`CodeResolution`](Self::CodeResolution) error.
    pub fn code_resolution(code_uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CodeResolution {
            code_uri: code_uri.into(),
            reason: reason.into(),
        }
    }

    /// Creates an [`Execution`](Self::Execution) error.
    pub fn execution(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for schema violations of any boundary.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidSchema { .. })
    }
}

/// Failure reported by policy code itself.
///
/// Construct implementations return this; the instance wraps it into
/// [`PolicyError::Execution`] together with the rule id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConstructError(pub String);

impl ConstructError {
    /// Creates a construct error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<serde_json::Error> for ConstructError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}
