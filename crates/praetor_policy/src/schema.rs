//! JSON Schema validation at every policy boundary.

use core::fmt;

use hashbrown::HashMap;
use serde_json::Value;

use crate::error::{PolicyError, SchemaTarget};
use crate::rule::PolicyRule;

/// A compiled schema bound to the boundary it guards.
///
/// A `null` schema compiles to a validator that accepts everything.
pub struct SchemaValidator {
    target: SchemaTarget,
    validator: Option<jsonschema::Validator>,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("target", &self.target)
            .field("permissive", &self.validator.is_none())
            .finish()
    }
}

impl SchemaValidator {
    /// Compiles `schema` for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidSchema`] if the schema does not compile.
    pub fn compile(target: SchemaTarget, schema: &Value) -> Result<Self, PolicyError> {
        if schema.is_null() {
            return Ok(Self {
                target,
                validator: None,
            });
        }
        match jsonschema::validator_for(schema) {
            Ok(validator) => Ok(Self {
                target,
                validator: Some(validator),
            }),
            Err(err) => Err(PolicyError::InvalidSchema {
                target,
                message: err.to_string(),
            }),
        }
    }

    /// The boundary this validator guards.
    #[must_use]
    pub fn target(&self) -> &SchemaTarget {
        &self.target
    }

    /// Validates `document`, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Validation`] listing each violation as
    /// `instance_path: message`.
    pub fn validate(&self, document: &Value) -> Result<(), PolicyError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let violations: Vec<String> = validator
            .iter_errors(document)
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::Validation {
                target: self.target.clone(),
                violations,
            })
        }
    }
}

/// Every schema of one rule, compiled once and shared by its instances.
#[derive(Debug)]
pub struct CompiledSchemas {
    /// Evaluation input.
    pub input: SchemaValidator,
    /// Evaluation output.
    pub output: SchemaValidator,
    /// Construction settings.
    pub settings: SchemaValidator,
    /// Parameters, checked at load and after every management call.
    pub parameters: SchemaValidator,
    commands: HashMap<String, SchemaValidator>,
}

impl CompiledSchemas {
    /// Compiles the schemas declared by `rule`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidSchema`] for the first schema that fails.
    pub fn compile(rule: &PolicyRule) -> Result<Self, PolicyError> {
        let schemas = &rule.schemas;
        let mut commands = HashMap::with_capacity(rule.management_commands.len());
        for command in &rule.management_commands {
            let validator = SchemaValidator::compile(
                SchemaTarget::Management(command.name.clone()),
                &command.schema,
            )?;
            commands.insert(command.name.clone(), validator);
        }
        Ok(Self {
            input: SchemaValidator::compile(SchemaTarget::Input, &schemas.input)?,
            output: SchemaValidator::compile(SchemaTarget::Output, &schemas.output)?,
            settings: SchemaValidator::compile(SchemaTarget::Settings, &schemas.settings)?,
            parameters: SchemaValidator::compile(SchemaTarget::Parameters, &schemas.parameters)?,
            commands,
        })
    }

    /// The validator for a declared management command.
    #[must_use]
    pub fn command(&self, action: &str) -> Option<&SchemaValidator> {
        self.commands.get(action)
    }
}
