//! The capability interface policy code implements.
//!
//! A code bundle exposes a [`PolicyFactory`] under its entrypoint name. The
//! factory builds a [`PolicyConstruct`] from `(rule_id, settings, parameters)`,
//! and the construct then serves `evaluate` and `manage` calls for the
//! lifetime of its [`PolicyInstance`](crate::PolicyInstance).
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use praetor_policy::{ConstructError, JsonMap, PolicyConstruct};
//! use serde_json::{Value, json};
//!
//! struct Allowlist;
//!
//! #[async_trait]
//! impl PolicyConstruct for Allowlist {
//!     async fn evaluate(
//!         &mut self,
//!         parameters: &JsonMap,
//!         input: Value,
//!         _context: &mut JsonMap,
//!     ) -> Result<Value, ConstructError> {
//!         let allowed = parameters
//!             .get("allowlist")
//!             .and_then(Value::as_array)
//!             .is_some_and(|list| list.contains(&input["ip"]));
//!         Ok(json!({ "allowed": allowed }))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::JsonMap;
use crate::error::ConstructError;

/// A constructed unit of policy logic.
///
/// Calls against one construct are serialized by its owning instance, so
/// implementations may mutate `self`, `parameters`, and `context` freely.
#[async_trait]
pub trait PolicyConstruct: Send + 'static {
    /// Evaluates one input.
    ///
    /// `context` is the instance's memory between evaluations. It starts empty
    /// and, in stateless modes, is cleared after every call.
    async fn evaluate(
        &mut self,
        parameters: &JsonMap,
        input: Value,
        context: &mut JsonMap,
    ) -> Result<Value, ConstructError>;

    /// Handles a declared management action.
    ///
    /// The action name and `data` have already been validated against the
    /// rule's command list. The default rejects every action.
    async fn manage(
        &mut self,
        action: &str,
        _data: Value,
        _parameters: &mut JsonMap,
        _context: &mut JsonMap,
    ) -> Result<Value, ConstructError> {
        Err(ConstructError::new(format!(
            "construct has no handler for '{action}'"
        )))
    }
}

/// Builds constructs for one code bundle entrypoint.
///
/// Implemented for any `Fn(&str, &JsonMap, &JsonMap) -> Result<Box<dyn PolicyConstruct>, ConstructError>`.
pub trait PolicyFactory: Send + Sync + 'static {
    /// Constructs a new instance of the policy logic.
    ///
    /// # Errors
    ///
    /// Returns a [`ConstructError`] if the settings cannot be honoured.
    fn construct(
        &self,
        rule_id: &str,
        settings: &JsonMap,
        parameters: &JsonMap,
    ) -> Result<Box<dyn PolicyConstruct>, ConstructError>;
}

impl<F> PolicyFactory for F
where
    F: Fn(&str, &JsonMap, &JsonMap) -> Result<Box<dyn PolicyConstruct>, ConstructError>
        + Send
        + Sync
        + 'static,
{
    fn construct(
        &self,
        rule_id: &str,
        settings: &JsonMap,
        parameters: &JsonMap,
    ) -> Result<Box<dyn PolicyConstruct>, ConstructError> {
        self(rule_id, settings, parameters)
    }
}
