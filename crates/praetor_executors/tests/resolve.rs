//! Executor resolution, policy-driven allocation, and probe sweeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use praetor_executors::*;
use praetor_policy::prelude::*;
use praetor_system::server::Server;
use serde_json::{Value, json};

/// Answers with `hints.prefer` when present, otherwise the first healthy
/// executor in the snapshot.
struct FirstHealthy;

#[async_trait]
impl PolicyConstruct for FirstHealthy {
    async fn evaluate(
        &mut self,
        _parameters: &JsonMap,
        input: Value,
        context: &mut JsonMap,
    ) -> Result<Value, ConstructError> {
        if let Some(preferred) = input.get("prefer") {
            return Ok(json!({ "executor_id": preferred }));
        }
        let chosen = context
            .get("executors")
            .and_then(Value::as_array)
            .and_then(|executors| {
                executors
                    .iter()
                    .find(|e| e["executor_status"] == "healthy")
                    .map(|e| e["executor_id"].clone())
            })
            .unwrap_or(Value::Null);
        Ok(json!({ "executor_id": chosen }))
    }
}

const ALLOCATOR: &str = "first-healthy:1-stable";

fn loader() -> Arc<PolicyLoader> {
    let rules = Arc::new(InMemoryPolicyStore::new());
    rules
        .register(
            PolicyRule::new("first-healthy", "1", "stable", "bundle://alloc", ExecutionType::Local)
                .unwrap()
                .with_input_schema(json!({"type": "object"}))
                .with_output_schema(json!({"type": "object", "required": ["executor_id"]})),
        )
        .unwrap();
    let bundles = Arc::new(InMemoryCodeStore::new());
    bundles.insert(CodeBundle::new("bundle://alloc", "first-healthy"));
    let mut constructs = ConstructRegistry::new();
    constructs.register("first-healthy", |_: &str, _: &JsonMap, _: &JsonMap| {
        Ok::<_, ConstructError>(Box::new(FirstHealthy) as Box<dyn PolicyConstruct>)
    });
    Arc::new(PolicyLoader::new(rules, bundles, Arc::new(constructs)))
}

fn registry() -> ExecutorRegistry {
    let registry = ExecutorRegistry::new();
    registry
        .register(PolicyExecutor::new("executor-000", "http://a").with_status(ExecutorStatus::Busy))
        .unwrap();
    registry
        .register(
            PolicyExecutor::new("executor-001", "http://b").with_status(ExecutorStatus::Healthy),
        )
        .unwrap();
    registry
        .set_allocator(ResourceAllocator::from_rule(loader(), PolicyRuleUri::parse(ALLOCATOR).unwrap(), Overrides::none()));
    registry
}

#[tokio::test]
async fn allocator_choice_is_used_when_no_executor_is_named() {
    let registry = registry();
    let executor = registry
        .resolve(None, &ResolveOptions::default().with_hints(json!({})))
        .await
        .unwrap();
    assert_eq!(executor.executor_id, "executor-001");

    let explicit = registry
        .resolve(
            Some(""),
            &ResolveOptions::default().with_hints(json!({"prefer": "executor-001"})),
        )
        .await
        .unwrap();
    assert_eq!(explicit.executor_id, "executor-001");
}

#[tokio::test]
async fn allocator_naming_unknown_or_unhealthy_executor_fails() {
    let registry = registry();

    let unknown = registry
        .resolve(None, &ResolveOptions::default().with_hints(json!({"prefer": "executor-404"})))
        .await
        .unwrap_err();
    assert!(matches!(unknown, RegistryError::Allocation(ref reason) if reason.contains("executor-404")));

    let busy = registry
        .resolve(None, &ResolveOptions::default().with_hints(json!({"prefer": "executor-000"})))
        .await
        .unwrap_err();
    assert!(matches!(busy, RegistryError::Allocation(ref reason) if reason.contains("busy")));
}

#[tokio::test]
async fn allocator_without_answer_fails() {
    let registry = registry();
    registry
        .update_status("executor-001", ExecutorStatus::Unreachable)
        .unwrap();
    let err = registry
        .resolve(None, &ResolveOptions::default().with_hints(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Allocation(_)));
}

#[tokio::test]
async fn allocator_policy_failures_are_reported() {
    let registry = ExecutorRegistry::new();
    registry.set_allocator(ResourceAllocator::from_rule(
        loader(),
        PolicyRuleUri::parse("missing:1-stable").unwrap(),
        Overrides::none(),
    ));
    let err = registry
        .resolve(None, &ResolveOptions::default().with_hints(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Allocator(PolicyError::NotFound(_))));

    // Hints must satisfy the allocator's input schema.
    let registry = ExecutorRegistry::new();
    registry.set_allocator(ResourceAllocator::from_rule(
        loader(),
        PolicyRuleUri::parse(ALLOCATOR).unwrap(),
        Overrides::none(),
    ));
    let err = registry
        .resolve(None, &ResolveOptions::default().with_hints(json!("gpu")))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Allocator(PolicyError::Validation { .. })));
}

struct CountingProbe {
    calls: AtomicUsize,
    slow: &'static str,
}

#[async_trait]
impl HealthProbe for CountingProbe {
    async fn probe(&self, executor: &PolicyExecutor) -> ExecutorStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if executor.executor_id == self.slow {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        ExecutorStatus::Healthy
    }
}

#[tokio::test]
async fn resolve_never_probes_and_probe_sweep_is_bounded() {
    let registry = registry();
    let probe = CountingProbe {
        calls: AtomicUsize::new(0),
        slow: "executor-001",
    };

    registry
        .resolve(Some("executor-001"), &ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

    let started = std::time::Instant::now();
    let report = registry.probe_all(&probe, Duration::from_millis(50)).await;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.timed_out, vec!["executor-001".to_string()]);
    assert_eq!(report.healthy(), 1);
    assert_eq!(
        registry.get("executor-000").unwrap().executor_status,
        ExecutorStatus::Healthy
    );
    assert_eq!(
        registry.get("executor-001").unwrap().executor_status,
        ExecutorStatus::Unreachable
    );
}

#[test]
fn plugin_binds_allocator_rule() {
    let mut server = Server::new();
    server
        .add_plugins(
            ExecutorsPlugin::new()
                .with_allocator(PolicyRuleUri::parse(ALLOCATOR).unwrap(), Overrides::none()),
        )
        .add_plugins(PoliciesPlugin::default());
    server.finish();

    assert!(server.global::<ExecutorRegistry>().unwrap().has_allocator());
}
