//! Graph execution over deployed functions.


use std::time::Duration;

use praetor_core_plugins::RuntimeConfig;
use praetor_graph::{GraphError, GraphOutcome, GraphSpec, NodeStatus};
use praetor_runtime::*;
use serde_json::json;
use test_utils::*;

async fn run_graph(fx: &Fixture, input: serde_json::Value) -> Result<GraphOutcome, DispatchError> {
    match fx
        .dispatcher
        .execute(ExecutionRequest::graph(IP_CHECK_GRAPH, input))
        .await?
    {
        ExecutionResponse::Graph(outcome) => Ok(outcome),
        other => panic!("expected a graph outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn diamond_joins_both_branches() {
    let fx = fixture();
    fx.deploy_stages().await;

    let outcome = run_graph(&fx, json!({"ip": "198.51.100.4"})).await.unwrap();

    assert_eq!(outcome.output["stage"], "funcD");
    let joined = &outcome.output["received"];
    assert_eq!(joined["funcB"]["stage"], "funcB");
    assert_eq!(joined["funcC"]["stage"], "funcC");
    assert_eq!(
        joined["funcB"]["received"]["received"],
        json!({"ip": "198.51.100.4"})
    );
    assert_eq!(
        outcome.run.waves,
        vec![vec!["funcA"], vec!["funcB", "funcC"], vec!["funcD"]]
    );
    assert_eq!(outcome.run.completed().len(), 4);
}

#[tokio::test]
async fn branches_run_concurrently() {
    let fx = fixture_with(RuntimeConfig::default(), Duration::from_millis(100));
    fx.deploy_stages().await;

    let outcome = run_graph(&fx, json!({"ip": "198.51.100.4"})).await.unwrap();
    let b = outcome.run.node("funcB").unwrap();
    let c = outcome.run.node("funcC").unwrap();
    let d = outcome.run.node("funcD").unwrap();

    assert!(b.started_after < c.started_after + c.duration);
    assert!(c.started_after < b.started_after + b.duration);
    assert!(d.started_after >= b.started_after + b.duration);
    assert!(d.started_after >= c.started_after + c.duration);
}

#[tokio::test]
async fn node_state_persists_across_runs() {
    let fx = fixture();
    fx.deploy_stages().await;

    run_graph(&fx, json!({"ip": "198.51.100.4"})).await.unwrap();
    let outcome = run_graph(&fx, json!({"ip": "198.51.100.4"})).await.unwrap();
    assert_eq!(outcome.output["seen"], 2);
}

#[tokio::test]
async fn a_missing_branch_stops_the_join() {
    let fx = fixture_with(RuntimeConfig::default(), Duration::from_millis(100));
    fx.deploy_stages().await;

    // funcC goes away while funcA is still running.
    let (result, removed) = tokio::join!(run_graph(&fx, json!({"ip": "198.51.100.4"})), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        fx.functions().remove_function("funcC").await
    });
    removed.unwrap();

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    let DispatchError::Graph(GraphError::NodeFailed { node, run, .. }) = err else {
        panic!("expected a node failure");
    };
    assert_eq!(node, "funcC");
    assert_eq!(run.node("funcB").unwrap().status, NodeStatus::Succeeded);
    assert!(!run.was_invoked("funcD"));
}

#[tokio::test]
async fn undeployed_nodes_fail_the_run() {
    let fx = fixture();
    let err = run_graph(&fx, json!({"ip": "198.51.100.4"})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn missing_sink_rejects_before_any_wave() {
    let fx = fixture();
    for id in ["funcA", "funcB", "funcC"] {
        fx.deploy_stage(id).await;
    }

    let err = run_graph(&fx, json!({"ip": "198.51.100.4"})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("funcD"), "{err}");

    // funcA never ran as part of the rejected graph.
    let output = fx
        .functions()
        .invoke_function("funcA", json!({"ip": "198.51.100.4"}))
        .await
        .unwrap();
    assert_eq!(output["seen"], 1);
}

#[tokio::test]
async fn graph_input_is_validated() {
    let fx = fixture();
    fx.deploy_stages().await;

    let err = run_graph(&fx, json!({"address": "198.51.100.4"})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unknown_graphs_are_not_found() {
    let fx = fixture();
    let err = fx
        .dispatcher
        .execute(ExecutionRequest::graph("geo-check:1.0-stable", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn slow_graphs_time_out() {
    let config = RuntimeConfig::default().with_graph_timeout(Duration::from_millis(150));
    let fx = fixture_with(config, Duration::from_millis(100));
    fx.deploy_stages().await;

    let err = run_graph(&fx, json!({"ip": "198.51.100.4"})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    let run = err_run(&err);
    assert!(run.was_invoked("funcA"));
    assert!(!run.was_invoked("funcD"));
}

#[tokio::test]
async fn request_timeouts_override_the_config() {
    let fx = fixture_with(RuntimeConfig::default(), Duration::from_millis(100));
    fx.deploy_stages().await;

    let err = fx
        .dispatcher
        .execute(
            ExecutionRequest::graph(IP_CHECK_GRAPH, json!({"ip": "198.51.100.4"}))
                .with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Graph(GraphError::TimedOut { .. })));
}

#[tokio::test]
async fn graphs_can_be_registered_at_runtime() {
    let fx = fixture();
    fx.deploy_stages().await;

    let chain = GraphSpec::new("ip-chain", "1.0", "stable")
        .unwrap()
        .with_nodes(["funcA", "funcB"])
        .with_edge("funcA", "funcB");
    fx.dispatcher.graphs().register(chain).unwrap();
    assert_eq!(fx.dispatcher.graphs().len(), 2);

    let response = fx
        .dispatcher
        .execute(ExecutionRequest::graph("ip-chain:1.0-stable", json!({"ip": "198.51.100.4"})))
        .await
        .unwrap();
    assert_eq!(response.output().unwrap()["stage"], "funcB");

    let cycle = GraphSpec::new("ip-loop", "1.0", "stable")
        .unwrap()
        .with_nodes(["funcA", "funcB"])
        .with_edge("funcA", "funcB")
        .with_edge("funcB", "funcA");
    let err = fx.dispatcher.graphs().register(cycle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GraphValidation);
}

fn err_run(err: &DispatchError) -> &praetor_graph::GraphRun {
    match err {
        DispatchError::Graph(graph) => graph.run().expect("run report"),
        other => panic!("expected a graph error, got {other}"),
    }
}
