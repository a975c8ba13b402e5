//! Example IP checks built with Praetor.
//!
//! Two pieces of policy code and the rules that use them:
//!
//! - `ip-allowlist:1.0-stable` (function): allows an IP if it is on the
//!   `allowlist` parameter, and counts calls in its context
//! - `ip-reputation:1.0-stable` (stateless): scores an IP against the
//!   `blocked_prefixes` parameter
//!
//! and the graph they form:
//!
//! ```text
//!            ┌──────────────┐
//!        ┌──▶│ funcB (list) │───┐
//! ┌──────┴┐  └──────────────┘   ▼
//! │ funcA │                  ┌───────┐
//! └──────┬┘  ┌──────────────┐  │ funcD │
//!        └──▶│ funcC (list) │─▶└───────┘
//!            └──────────────┘
//! ```
//!
//! `funcA` normalises the request, `funcB` and `funcC` check two allow-lists
//! concurrently, and `funcD` combines their verdicts.

use async_trait::async_trait;
use praetor_graph::GraphSpec;
use praetor_policy::prelude::*;
use praetor_system::plugin::{Plugin, PluginId};
use praetor_system::server::Server;
use serde_json::{Value, json};

/// The stateful allow-list rule.
pub const ALLOWLIST: &str = "ip-allowlist:1.0-stable";
/// The stateless reputation rule.
pub const REPUTATION: &str = "ip-reputation:1.0-stable";
/// The graph over the four allow-list functions.
pub const IP_CHECK: &str = "ip-check:1.0-stable";

/// Allow-list check. Settings select the role it plays in the graph.
struct Allowlist {
    role: String,
}

impl Allowlist {
    fn ip(input: &Value) -> Option<&str> {
        input
            .get("ip")
            .or_else(|| input.pointer("/request/ip"))
            .and_then(Value::as_str)
    }
}

#[async_trait]
impl PolicyConstruct for Allowlist {
    async fn evaluate(
        &mut self,
        parameters: &JsonMap,
        input: Value,
        context: &mut JsonMap,
    ) -> Result<Value, ConstructError> {
        let checks = context.get("checks").and_then(Value::as_u64).unwrap_or(0) + 1;
        context.insert("checks".into(), json!(checks));

        match self.role.as_str() {
            "normalise" => {
                let ip = Self::ip(&input).ok_or_else(|| ConstructError::new("no ip in request"))?;
                Ok(json!({ "request": { "ip": ip.trim() }, "checks": checks }))
            }
            "combine" => {
                let verdicts: Vec<bool> = input
                    .as_object()
                    .map(|branches| {
                        branches
                            .values()
                            .map(|branch| branch["allowed"].as_bool().unwrap_or(false))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(json!({
                    "allowed": !verdicts.is_empty() && verdicts.iter().all(|allowed| *allowed),
                    "checks": checks,
                }))
            }
            _ => {
                let ip = Self::ip(&input).ok_or_else(|| ConstructError::new("no ip in request"))?;
                let allowed = parameters
                    .get("allowlist")
                    .and_then(Value::as_array)
                    .is_some_and(|list| list.iter().any(|entry| entry == ip));
                Ok(json!({ "allowed": allowed, "ip": ip, "checks": checks }))
            }
        }
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
                parameters.insert("allowlist".into(), data["allowlist"].clone());
                Ok(json!({ "allowlist": data["allowlist"] }))
            }
            "reset_counters" => {
                context.remove("checks");
                Ok(Value::Null)
            }
            other => Err(ConstructError::new(format!("unsupported action {other}"))),
        }
    }
}

struct Reputation;

#[async_trait]
impl PolicyConstruct for Reputation {
    async fn evaluate(
        &mut self,
        parameters: &JsonMap,
        input: Value,
        _context: &mut JsonMap,
    ) -> Result<Value, ConstructError> {
        let ip = input["ip"].as_str().unwrap_or_default();
        let blocked = parameters
            .get("blocked_prefixes")
            .and_then(Value::as_array)
            .is_some_and(|prefixes| {
                prefixes
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|prefix| ip.starts_with(prefix))
            });
        Ok(json!({ "ip": ip, "score": if blocked { 0 } else { 100 } }))
    }
}

fn object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

/// Registers the example rules in `store` and their code in `code`.
///
/// # Errors
///
/// Returns [`PolicyError::AlreadyRegistered`] if a rule is already present.
pub fn register_rules(
    store: &InMemoryPolicyStore,
    code: &InMemoryCodeStore,
) -> Result<(), PolicyError> {
    code.insert(CodeBundle::new("bundle://ip-allowlist", "allowlist"));
    code.insert(CodeBundle::new("bundle://ip-reputation", "reputation"));

    store.register(
        PolicyRule::new("ip-allowlist", "1.0", "stable", "bundle://ip-allowlist", ExecutionType::Function)?
            .with_input_schema(json!({"type": "object"}))
            .with_output_schema(json!({"type": "object", "required": ["checks"]}))
            .with_settings_schema(json!({
                "type": "object",
                "properties": {"role": {"enum": ["normalise", "check", "combine"]}}
            }))
            .with_parameters_schema(json!({
                "type": "object",
                "properties": {"allowlist": {"type": "array", "items": {"type": "string"}}}
            }))
            .with_default_settings(object(json!({"role": "check"})))
            .with_default_parameters(object(json!({"allowlist": ["10.0.0.1", "10.0.0.2"]})))
            .with_management_command(ManagementCommand::new(
                "update_local_allowlist",
                json!({"type": "object", "required": ["allowlist"]}),
            ))
            .with_management_command(ManagementCommand::new("reset_counters", Value::Null)),
    )?;

    store.register(
        PolicyRule::new("ip-reputation", "1.0", "stable", "bundle://ip-reputation", ExecutionType::Stateless)?
            .with_input_schema(json!({
                "type": "object",
                "properties": {"ip": {"type": "string"}},
                "required": ["ip"]
            }))
            .with_output_schema(json!({"type": "object", "required": ["score"]}))
            .with_default_parameters(object(json!({"blocked_prefixes": ["192.0.2."]}))),
    )?;
    Ok(())
}

/// The `funcA -> {funcB, funcC} -> funcD` graph.
///
/// # Errors
///
/// Never, for the literal uri used here.
pub fn ip_check_graph() -> Result<GraphSpec, PolicyError> {
    Ok(GraphSpec::new("ip-check", "1.0", "stable")?
        .with_nodes(["funcA", "funcB", "funcC", "funcD"])
        .with_edge("funcA", "funcB")
        .with_edge("funcA", "funcC")
        .with_edge("funcB", "funcD")
        .with_edge("funcC", "funcD")
        .with_input_schema(json!({
            "type": "object",
            "properties": {"ip": {"type": "string"}},
            "required": ["ip"]
        })))
}

/// Links the example policy code into the server.
#[derive(Debug, Default)]
pub struct IpChecksPlugin;

impl Plugin for IpChecksPlugin {
    fn build(&self, server: &mut Server) {
        let mut constructs = server
            .get_resource_mut::<ConstructRegistry>()
            .expect("PoliciesPlugin must be added before IpChecksPlugin");
        constructs.register("allowlist", |_: &str, settings: &JsonMap, _: &JsonMap| {
            let role = settings
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("check")
                .to_string();
            Ok::<_, ConstructError>(Box::new(Allowlist { role }) as Box<dyn PolicyConstruct>)
        });
        constructs.register("reputation", |_: &str, _: &JsonMap, _: &JsonMap| {
            Ok::<_, ConstructError>(Box::new(Reputation) as Box<dyn PolicyConstruct>)
        });
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<PoliciesPlugin>()]
    }
}
