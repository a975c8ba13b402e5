//! Policy rules and the lifecycle of loaded policy instances.
//!
//! A [`PolicyRule`] is an onboarded, versioned unit of logic identified by a
//! derived [`PolicyRuleUri`]. The [`PolicyLoader`] resolves a rule's code
//! bundle to a registered [`PolicyFactory`], validates settings and parameter
//! overrides, and constructs a [`PolicyInstance`] that serves `evaluate` and
//! `manage` calls with schema validation at every boundary.
//!
//! # Modules
//!
//! - [`uri`] - `{name}:{version}-{release_tag}` identifiers
//! - [`rule`] - rule record, execution types and modes, overrides
//! - [`schema`] - compiled JSON Schema validators
//! - [`construct`] - the capability interface policy code implements
//! - [`code`] - code bundles and the construct registry
//! - [`store`] - rule registry contract and in-memory store
//! - [`filter`] - typed query filters over rule records
//! - [`instance`] - instance keys and loaded instances
//! - [`loader`] - the instance loader and cache
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use praetor_policy::prelude::*;
//! use serde_json::{Value, json};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl PolicyConstruct for Echo {
//!     async fn evaluate(&mut self, _p: &JsonMap, input: Value, _c: &mut JsonMap) -> Result<Value, ConstructError> {
//!         Ok(input)
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let rules = Arc::new(InMemoryPolicyStore::new());
//! let rule = rules
//!     .register(PolicyRule::new("echo", "1", "stable", "bundle://echo", ExecutionType::Local).unwrap())
//!     .unwrap();
//!
//! let bundles = Arc::new(InMemoryCodeStore::new());
//! bundles.insert(CodeBundle::new("bundle://echo", "echo"));
//!
//! let mut constructs = ConstructRegistry::new();
//! constructs.register("echo", |_: &str, _: &JsonMap, _: &JsonMap| {
//!     Ok::<_, ConstructError>(Box::new(Echo) as Box<dyn PolicyConstruct>)
//! });
//!
//! let loader = PolicyLoader::new(rules, bundles, Arc::new(constructs));
//! let instance = loader
//!     .load(rule.uri(), ExecutionMode::Local, &Overrides::none(), None)
//!     .await
//!     .unwrap();
//! assert_eq!(instance.evaluate(json!({"ip": "10.0.0.1"})).await.unwrap()["ip"], "10.0.0.1");
//! # });
//! ```

pub mod code;
pub mod construct;
pub mod error;
pub mod filter;
pub mod instance;
pub mod loader;
mod plugin;
pub mod rule;
pub mod schema;
pub mod store;
pub mod uri;

/// A JSON object.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

pub use code::{CodeBundle, CodeStore, ConstructRegistry, InMemoryCodeStore};
pub use construct::{PolicyConstruct, PolicyFactory};
pub use error::{ConstructError, PolicyError, SchemaTarget};
pub use filter::Filter;
pub use instance::{InstanceKey, PolicyInstance, fingerprint};
pub use loader::PolicyLoader;
pub use plugin::PoliciesPlugin;
pub use rule::{
    ExecutionMode, ExecutionType, ManagementCommand, Overrides, PolicyRule, PolicySchemas,
    merge_overrides,
};
pub use schema::{CompiledSchemas, SchemaValidator};
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use uri::{PolicyRuleUri, VersionedUri};

/// Common policy types.
pub mod prelude {
    pub use crate::{
        CodeBundle, CodeStore, ConstructError, ConstructRegistry, ExecutionMode, ExecutionType,
        Filter, InMemoryCodeStore, InMemoryPolicyStore, JsonMap, ManagementCommand, Overrides,
        PoliciesPlugin, PolicyConstruct, PolicyError, PolicyFactory, PolicyInstance, PolicyLoader,
        PolicyRule, PolicyRuleUri, PolicyStore,
    };
}
