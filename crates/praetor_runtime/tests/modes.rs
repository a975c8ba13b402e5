//! Local and remote execution, mode checks, and executor resolution.


use std::time::Duration;

use praetor_executors::ExecutorStatus;
use praetor_policy::{ExecutionMode, Overrides};
use praetor_runtime::*;
use serde_json::json;
use test_utils::*;

#[tokio::test]
async fn local_instances_keep_context_between_calls() {
    let fx = fixture();

    for expected in 1..=3 {
        let response = fx
            .dispatcher
            .execute(ExecutionRequest::local(ALLOWLIST, json!({"ip": "10.0.0.1"})))
            .await
            .unwrap();
        assert_eq!(
            response,
            ExecutionResponse::Output(json!({"allowed": true, "seen": expected}))
        );
    }
}

#[tokio::test]
async fn local_overrides_select_a_separate_instance() {
    let fx = fixture();
    let overrides = Overrides::none().with_parameters(object(json!({"allowlist": ["192.168.1.9"]})));

    fx.dispatcher
        .execute(ExecutionRequest::local(ALLOWLIST, json!({"ip": "10.0.0.1"})))
        .await
        .unwrap();
    let response = fx
        .dispatcher
        .execute(
            ExecutionRequest::local(ALLOWLIST, json!({"ip": "192.168.1.9"}))
                .with_overrides(overrides),
        )
        .await
        .unwrap();

    assert_eq!(response.output(), Some(&json!({"allowed": true, "seen": 1})));
}

#[tokio::test]
async fn local_rejects_bad_input_and_bad_overrides() {
    let fx = fixture();

    let err = fx
        .dispatcher
        .execute(ExecutionRequest::local(ALLOWLIST, json!({"ip": 10})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = fx
        .dispatcher
        .execute(
            ExecutionRequest::local(ALLOWLIST, json!({"ip": "10.0.0.1"}))
                .with_overrides(Overrides::none().with_parameters(object(json!({"threshold": 500})))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unknown_rules_and_malformed_uris() {
    let fx = fixture();

    let err = fx
        .dispatcher
        .execute(ExecutionRequest::local("ip-denylist:1.0-stable", json!({"ip": "10.0.0.1"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = fx
        .dispatcher
        .execute(ExecutionRequest::local("ip-allowlist", json!({"ip": "10.0.0.1"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn construct_failures_are_execution_errors() {
    let fx = fixture();
    let err = fx
        .dispatcher
        .execute(ExecutionRequest::local(ALLOWLIST, json!({"ip": "0.0.0.0"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(err.report().kind, ErrorKind::Execution);
}

#[tokio::test]
async fn remote_calls_never_share_context() {
    let fx = fixture();

    for _ in 0..2 {
        let response = fx
            .dispatcher
            .execute(ExecutionRequest::remote(GEO, json!({"ip": "10.0.0.1"})).with_executor("executor-001"))
            .await
            .unwrap();
        assert_eq!(response.output(), Some(&json!({"country": "NL", "seen": 1})));
    }
}

#[tokio::test]
async fn remote_manage_does_not_outlive_the_call() {
    let fx = fixture();

    let countries = fx
        .dispatcher
        .manage(
            ManageRequest::new(
                ExecutionMode::Remote,
                GEO,
                "set_country",
                json!({"ip": "10.0.0.2", "country": "BE"}),
            )
            .with_executor("executor-001"),
        )
        .await
        .unwrap();
    assert_eq!(countries["10.0.0.2"], "BE");

    let response = fx
        .dispatcher
        .execute(ExecutionRequest::remote(GEO, json!({"ip": "10.0.0.2"})).with_executor("executor-001"))
        .await
        .unwrap();
    assert_eq!(response.output().unwrap()["country"], "unknown");
}

#[tokio::test]
async fn local_manage_reaches_the_cached_instance() {
    let fx = fixture();

    fx.dispatcher
        .manage(ManageRequest::new(
            ExecutionMode::Local,
            ALLOWLIST,
            "update_local_allowlist",
            json!({"allowlist": ["172.16.0.4"]}),
        ))
        .await
        .unwrap();

    let response = fx
        .dispatcher
        .execute(ExecutionRequest::local(ALLOWLIST, json!({"ip": "172.16.0.4"})))
        .await
        .unwrap();
    assert_eq!(response.output().unwrap()["allowed"], true);

    let err = fx
        .dispatcher
        .manage(ManageRequest::new(ExecutionMode::Local, ALLOWLIST, "reboot", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn stateful_rules_cannot_run_statelessly() {
    let fx = fixture();

    for request in [
        ExecutionRequest::remote(ALLOWLIST, json!({"ip": "10.0.0.1"})).with_executor("executor-001"),
        ExecutionRequest::job(ALLOWLIST, json!({"ip": "10.0.0.1"})).with_executor("executor-001"),
    ] {
        let err = fx.dispatcher.execute(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatefulNotSupported);
    }
}

#[tokio::test]
async fn management_is_refused_for_jobs_and_graphs() {
    let fx = fixture();
    for mode in [ExecutionMode::Job, ExecutionMode::Graph] {
        let err = fx
            .dispatcher
            .manage(ManageRequest::new(mode, GEO, "set_country", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[tokio::test]
async fn named_executors_must_be_healthy() {
    let fx = fixture();

    let err = fx
        .dispatcher
        .execute(ExecutionRequest::remote(GEO, json!({"ip": "10.0.0.1"})).with_executor("executor-002"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = fx
        .dispatcher
        .execute(ExecutionRequest::remote(GEO, json!({"ip": "10.0.0.1"})).with_executor("executor-404"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn unnamed_executors_are_allocated() {
    let fx = fixture();

    let handle = fx
        .dispatcher
        .execute(ExecutionRequest::job(GEO, json!({"ip": "10.0.0.1"})).with_executor(""))
        .await
        .unwrap()
        .job()
        .cloned()
        .unwrap();
    assert_eq!(handle.executor_id, "executor-001");

    let handle = fx
        .dispatcher
        .execute(ExecutionRequest::job(GEO, json!({"ip": "10.0.0.1"})).with_hints(json!({"prefer": "executor-003"})))
        .await
        .unwrap()
        .job()
        .cloned()
        .unwrap();
    assert_eq!(handle.executor_id, "executor-003");
}

#[tokio::test]
async fn allocator_choices_are_checked() {
    let fx = fixture();

    for prefer in ["executor-002", "executor-404"] {
        let err = fx
            .dispatcher
            .execute(
                ExecutionRequest::remote(GEO, json!({"ip": "10.0.0.1"}))
                    .with_hints(json!({"prefer": prefer})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Allocation, "{prefer}");
    }
}

#[tokio::test]
async fn status_changes_are_seen_by_resolution() {
    let fx = fixture();
    fx.dispatcher
        .registry()
        .update_status("executor-002", ExecutorStatus::Healthy)
        .unwrap();

    let response = fx
        .dispatcher
        .execute(ExecutionRequest::remote(GEO, json!({"ip": "10.0.0.1"})).with_executor("executor-002"))
        .await
        .unwrap();
    assert_eq!(response.output().unwrap()["country"], "NL");
}

#[tokio::test]
async fn tiny_deadlines_turn_into_unavailable() {
    let fx = fixture_with(Default::default(), Duration::from_millis(200));
    fx.deploy_stages().await;

    let err = fx
        .dispatcher
        .execute(ExecutionRequest::function("funcA", json!({})).with_timeout(Duration::from_millis(10)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

struct ScriptedProbe;

#[async_trait::async_trait]
impl praetor_executors::HealthProbe for ScriptedProbe {
    async fn probe(&self, executor: &praetor_executors::PolicyExecutor) -> ExecutorStatus {
        match executor.executor_id.as_str() {
            "executor-001" => ExecutorStatus::Busy,
            "executor-003" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ExecutorStatus::Healthy
            }
            _ => ExecutorStatus::Healthy,
        }
    }
}

#[tokio::test]
async fn probe_sweeps_feed_resolution() {
    let config = praetor_core_plugins::RuntimeConfig::default()
        .with_probe_window(Duration::from_millis(50));
    let fx = fixture_with(config, Duration::ZERO);

    let report = fx.dispatcher.probe_executors(&ScriptedProbe).await;
    assert_eq!(report.timed_out, ["executor-003"]);

    let registry = fx.dispatcher.registry();
    assert_eq!(registry.get("executor-001").unwrap().executor_status, ExecutorStatus::Busy);
    assert_eq!(registry.get("executor-002").unwrap().executor_status, ExecutorStatus::Healthy);
    assert_eq!(
        registry.get("executor-003").unwrap().executor_status,
        ExecutorStatus::Unreachable
    );

    let handle = fx
        .dispatcher
        .execute(ExecutionRequest::job(GEO, json!({"ip": "10.0.0.1"})))
        .await
        .unwrap()
        .job()
        .cloned()
        .unwrap();
    assert_eq!(handle.executor_id, "executor-002");
}
