//! Shared fixtures for `praetor_policy` integration tests.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities; not every item is used by every test binary"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use praetor_policy::prelude::*;
use serde_json::{Value, json};

pub const ALLOWLIST: &str = "ip-allowlist:1.0-stable";
pub const STRICT: &str = "ip-allowlist-strict:1.0-stable";

/// Observes how the construct is driven.
#[derive(Default)]
pub struct Tally {
    pub constructions: AtomicUsize,
    pub evaluations: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

/// Allows an IP if it is on the `allowlist` parameter. Counts evaluations in
/// its context under `seen`.
pub struct Allowlist {
    tally: Arc<Tally>,
    pause: Duration,
}

#[async_trait]
impl PolicyConstruct for Allowlist {
    async fn evaluate(
        &mut self,
        parameters: &JsonMap,
        input: Value,
        context: &mut JsonMap,
    ) -> Result<Value, ConstructError> {
        let now = self.tally.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.tally.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.tally.evaluations.fetch_add(1, Ordering::SeqCst);
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }

        let seen = context.get("seen").and_then(Value::as_u64).unwrap_or(0) + 1;
        context.insert("seen".into(), json!(seen));

        let allowed = parameters
            .get("allowlist")
            .and_then(Value::as_array)
            .is_some_and(|list| list.contains(&input["ip"]));

        self.tally.in_flight.fetch_sub(1, Ordering::SeqCst);
        if input["ip"] == "0.0.0.0" {
            return Err(ConstructError::new("refusing the unspecified address"));
        }
        Ok(json!({ "allowed": allowed, "seen": seen }))
    }

    async fn manage(
        &mut self,
        action: &str,
        data: Value,
        parameters: &mut JsonMap,
        context: &mut JsonMap,
    ) -> Result<Value, ConstructError> {
        match action {
            "update_local_allowlist" => {
                let list = data["allowlist"].clone();
                parameters.insert("allowlist".into(), list.clone());
                Ok(json!({ "allowlist": list }))
            }
            "corrupt" => {
                parameters.insert("allowlist".into(), json!(42));
                Ok(Value::Null)
            }
            "clear_context" => {
                context.clear();
                Ok(Value::Null)
            }
            "relabel_then_fail" => {
                parameters.insert("label".into(), json!("half-applied"));
                context.clear();
                Err(ConstructError::new("relabel interrupted"))
            }
            other => Err(ConstructError::new(format!("unhandled {other}"))),
        }
    }
}

pub fn allowlist_rule(name: &str, output_schema: Value) -> PolicyRule {
    PolicyRule::new(name, "1.0", "stable", "bundle://allowlist", ExecutionType::Function)
        .unwrap()
        .with_input_schema(json!({
            "type": "object",
            "properties": {"ip": {"type": "string"}},
            "required": ["ip"]
        }))
        .with_output_schema(output_schema)
        .with_settings_schema(json!({
            "type": "object",
            "properties": {"region": {"type": "string"}}
        }))
        .with_parameters_schema(json!({
            "type": "object",
            "properties": {
                "allowlist": {"type": "array", "items": {"type": "string"}},
                "threshold": {"type": "integer", "minimum": 0, "maximum": 100},
                "label": {"type": "string"}
            },
            "additionalProperties": false
        }))
        .with_default_settings(object(json!({"region": "eu"})))
        .with_default_parameters(object(json!({"allowlist": ["10.0.0.1"], "threshold": 1})))
        .with_management_command(ManagementCommand::new(
            "update_local_allowlist",
            json!({
                "type": "object",
                "properties": {"allowlist": {"type": "array", "items": {"type": "string"}}},
                "required": ["allowlist"]
            }),
        ))
        .with_management_command(ManagementCommand::new("corrupt", Value::Null))
        .with_management_command(ManagementCommand::new("clear_context", Value::Null))
        .with_management_command(ManagementCommand::new("relabel_then_fail", Value::Null))
}

pub fn object(value: Value) -> JsonMap {
    value.as_object().cloned().expect("object literal")
}

pub fn uri(raw: &str) -> PolicyRuleUri {
    PolicyRuleUri::parse(raw).expect("valid uri")
}

pub struct Fixture {
    pub loader: PolicyLoader,
    pub tally: Arc<Tally>,
    pub rules: Arc<InMemoryPolicyStore>,
    pub bundles: Arc<InMemoryCodeStore>,
}

pub fn fixture() -> Fixture {
    fixture_with_pause(Duration::ZERO)
}

pub fn fixture_with_pause(pause: Duration) -> Fixture {
    let rules = Arc::new(InMemoryPolicyStore::new());
    rules
        .register(allowlist_rule(
            "ip-allowlist",
            json!({"type": "object", "required": ["allowed"]}),
        ))
        .unwrap();
    rules
        .register(allowlist_rule(
            "ip-allowlist-strict",
            json!({"type": "object", "required": ["allowed", "score"]}),
        ))
        .unwrap();

    let bundles = Arc::new(InMemoryCodeStore::new());
    bundles.insert(CodeBundle::new("bundle://allowlist", "allowlist").with_requirement("ipnet"));

    let tally = Arc::new(Tally::default());
    let factory_tally = Arc::clone(&tally);
    let mut constructs = ConstructRegistry::new();
    constructs.register(
        "allowlist",
        move |_rule_id: &str, _settings: &JsonMap, _parameters: &JsonMap| {
            factory_tally.constructions.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ConstructError>(Box::new(Allowlist {
                tally: Arc::clone(&factory_tally),
                pause,
            }) as Box<dyn PolicyConstruct>)
        },
    );

    Fixture {
        loader: PolicyLoader::new(
            Arc::clone(&rules) as Arc<dyn PolicyStore>,
            Arc::clone(&bundles) as Arc<dyn CodeStore>,
            Arc::new(constructs),
        ),
        tally,
        rules,
        bundles,
    }
}
