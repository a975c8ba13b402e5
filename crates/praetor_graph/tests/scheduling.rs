//! Wave scheduling, join inputs, and result aggregation.


use core::time::Duration;
use std::sync::atomic::Ordering;

use praetor_graph::{GraphError, GraphExecutor, GraphSpec, GraphValidationError, NodeStatus};
use serde_json::json;
use test_utils::{ScriptedInvoker, end, ip_check_graph, start};

#[tokio::test]
async fn diamond_runs_branches_concurrently_and_joins_by_parent() {
    let invoker = ScriptedInvoker::new()
        .delay("funcB", Duration::from_millis(40))
        .delay("funcC", Duration::from_millis(40));

    let outcome = GraphExecutor::new()
        .execute(&ip_check_graph(), json!({"ip": "10.0.0.1"}), &invoker)
        .await
        .unwrap();

    assert_eq!(invoker.input_of("funcA"), Some(json!({"ip": "10.0.0.1"})));
    assert_eq!(invoker.input_of("funcB"), Some(json!({"by": "funcA"})));
    assert_eq!(
        invoker.input_of("funcD"),
        Some(json!({"funcB": {"by": "funcB"}, "funcC": {"by": "funcC"}}))
    );

    // B and C overlap, D waits for both.
    assert_eq!(invoker.max_in_flight.load(Ordering::SeqCst), 2);
    assert!(invoker.position(&end("funcA")) < invoker.position(&start("funcB")));
    assert!(invoker.position(&start("funcC")) < invoker.position(&end("funcB")));
    assert!(invoker.position(&end("funcB")) < invoker.position(&start("funcD")));
    assert!(invoker.position(&end("funcC")) < invoker.position(&start("funcD")));

    assert_eq!(outcome.output, json!({"by": "funcD"}));
    assert_eq!(
        outcome.run.waves,
        vec![vec!["funcA"], vec!["funcB", "funcC"], vec!["funcD"]]
    );
    assert_eq!(outcome.run.nodes.len(), 4);
    assert!(
        outcome
            .run
            .nodes
            .iter()
            .all(|record| record.status == NodeStatus::Succeeded)
    );
    assert_eq!(outcome.run.node("funcD").unwrap().wave, 2);
}

#[tokio::test]
async fn several_sinks_produce_keyed_output() {
    let spec = GraphSpec::new("fan-out", "1", "stable")
        .unwrap()
        .with_nodes(["root", "left", "right"])
        .with_edge("root", "left")
        .with_edge("root", "right")
        .with_output_schema(json!({
            "type": "object",
            "required": ["left", "right"]
        }));

    let outcome = GraphExecutor::new()
        .execute(&spec, json!({}), &ScriptedInvoker::new())
        .await
        .unwrap();

    assert_eq!(
        outcome.output,
        json!({"left": {"by": "left"}, "right": {"by": "right"}})
    );
}

#[tokio::test]
async fn every_source_receives_the_full_input() {
    let spec = GraphSpec::new("two-sources", "1", "stable")
        .unwrap()
        .with_nodes(["geo", "reputation", "verdict"])
        .with_edge("geo", "verdict")
        .with_edge("reputation", "verdict");
    let invoker = ScriptedInvoker::new();

    GraphExecutor::new()
        .execute(&spec, json!({"ip": "10.0.0.9"}), &invoker)
        .await
        .unwrap();

    assert_eq!(invoker.input_of("geo"), Some(json!({"ip": "10.0.0.9"})));
    assert_eq!(invoker.input_of("reputation"), Some(json!({"ip": "10.0.0.9"})));
}

#[tokio::test]
async fn cycle_is_rejected_before_any_node_runs() {
    let spec = GraphSpec::new("loop", "1", "stable")
        .unwrap()
        .with_nodes(["A", "B"])
        .with_edge("A", "B")
        .with_edge("B", "A");
    let invoker = ScriptedInvoker::new();

    let err = GraphExecutor::new()
        .execute(&spec, json!({}), &invoker)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GraphError::Validation(ref errors)
            if matches!(errors.as_slice(), [GraphValidationError::Cycle { .. }])
    ));
    assert!(invoker.events().is_empty());
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_node_runs() {
    let spec = ip_check_graph().with_input_schema(json!({
        "type": "object",
        "required": ["ip"],
        "properties": {"ip": {"type": "string"}}
    }));
    let invoker = ScriptedInvoker::new();

    let err = GraphExecutor::new()
        .execute(&spec, json!({"ip": 10}), &invoker)
        .await
        .unwrap_err();

    assert!(matches!(err, GraphError::InputValidation(_)));
    assert!(err.run().is_none());
    assert!(invoker.events().is_empty());
}

#[tokio::test]
async fn broken_schema_is_a_validation_error() {
    let spec = ip_check_graph().with_output_schema(json!({"type": "no-such-type"}));

    let err = GraphExecutor::new()
        .execute(&spec, json!({}), &ScriptedInvoker::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GraphError::Validation(ref errors)
            if matches!(errors.as_slice(), [GraphValidationError::InvalidSchema { boundary: "output", .. }])
    ));
}

#[tokio::test]
async fn output_contract_is_checked() {
    let spec = ip_check_graph().with_output_schema(json!({
        "type": "object",
        "required": ["allowed"]
    }));

    let err = GraphExecutor::new()
        .execute(&spec, json!({}), &ScriptedInvoker::new())
        .await
        .unwrap_err();

    let GraphError::OutputValidation { run, .. } = err else {
        panic!("expected an output validation error");
    };
    assert_eq!(run.completed().len(), 4);
}

#[tokio::test]
async fn concurrency_cap_limits_a_wide_wave() {
    let mut spec = GraphSpec::new("wide", "1", "stable").unwrap();
    let mut invoker = ScriptedInvoker::new();
    for i in 0..6 {
        let id = format!("n{i}");
        invoker = invoker.delay(&id, Duration::from_millis(10));
        spec = spec.with_node(id);
    }

    let outcome = GraphExecutor::new()
        .with_max_concurrency(2)
        .execute(&spec, json!({}), &invoker)
        .await
        .unwrap();

    assert_eq!(invoker.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.output.as_object().unwrap().len(), 6);
}
