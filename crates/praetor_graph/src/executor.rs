//! Wave-based DAG execution.
//!
//! A run proceeds in waves computed by [`validate_graph`]. Every node of a
//! wave is dispatched at once and the run suspends until all of them report
//! back; that barrier is the only synchronization point. If any node of a
//! wave fails, its siblings still finish but no later wave starts.

use core::time::Duration;
use std::time::Instant;

use futures::StreamExt;
use futures::future::join_all;
use hashbrown::HashMap;
use parking_lot::Mutex;
use praetor_core_plugins::RuntimeConfig;
use praetor_policy::{PolicyError, SchemaTarget, SchemaValidator};
use praetor_system::resource::GlobalResource;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::GraphError;
use crate::invoker::{NodeFailure, NodeInvoker};
use crate::run::{GraphRun, NodeRecord, NodeStatus};
use crate::spec::GraphSpec;
use crate::validate::{GraphValidationError, ValidatedGraph, validate_graph};

/// Result of a successful graph run.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphOutcome {
    /// The sink output, or a mapping from sink id to output when there are
    /// several sinks.
    pub output: Value,
    /// What happened during the run.
    pub run: GraphRun,
}

/// Executes validated graphs against a [`NodeInvoker`].
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use praetor_graph::{GraphExecutor, GraphSpec, NodeFailure, NodeInvoker};
/// use serde_json::{Value, json};
///
/// struct Echo;
///
/// #[async_trait]
/// impl NodeInvoker for Echo {
///     async fn invoke(&self, id: &str, input: Value) -> Result<Value, NodeFailure> {
///         Ok(json!({ "node": id, "input": input }))
///     }
/// }
///
/// # async fn demo() {
/// let graph = GraphSpec::new("pair", "1", "stable")
///     .unwrap()
///     .with_nodes(["first", "second"])
///     .with_edge("first", "second");
///
/// let outcome = GraphExecutor::new()
///     .execute(&graph, json!({"ip": "10.0.0.1"}), &Echo)
///     .await
///     .unwrap();
/// assert_eq!(outcome.output["node"], "second");
/// assert_eq!(outcome.output["input"]["node"], "first");
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(demo());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphExecutor {
    timeout: Option<Duration>,
    max_concurrency: Option<usize>,
}

impl GlobalResource for GraphExecutor {}

type WaveFailure = (String, NodeFailure);

impl GraphExecutor {
    /// Creates an executor with no deadline and unbounded waves.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor from the runtime configuration.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let mut executor = Self::new();
        executor.timeout = config.graph_timeout();
        if config.max_wave_concurrency > 0 {
            executor.max_concurrency = Some(config.max_wave_concurrency);
        }
        executor
    }

    /// Sets the deadline for a whole run.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Caps how many nodes of one wave are in flight at once.
    ///
    /// A cap of zero is treated as one.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max.max(1));
        self
    }

    /// The run deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs `spec` on `input`.
    ///
    /// Structure and input are checked before any node is invoked.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Validation`] if the graph or one of its schemas is malformed
    /// - [`GraphError::InputValidation`] if `input` violates the input schema
    /// - [`GraphError::NodeFailed`] for the first failing node
    /// - [`GraphError::TimedOut`] if the deadline passes
    /// - [`GraphError::OutputValidation`] if the result violates the output schema
    pub async fn execute(
        &self,
        spec: &GraphSpec,
        input: Value,
        invoker: &dyn NodeInvoker,
    ) -> Result<GraphOutcome, GraphError> {
        let graph = validate_graph(spec).map_err(GraphError::Validation)?;
        let input_schema = compile(SchemaTarget::Input, &spec.input_schema)?;
        let output_schema = compile(SchemaTarget::Output, &spec.output_schema)?;
        input_schema
            .validate(&input)
            .map_err(GraphError::InputValidation)?;

        let uri = spec.uri().to_string();
        info!(graph = %uri, nodes = graph.order.len(), waves = graph.waves.len(), "graph run started");

        let started = Instant::now();
        let run = Mutex::new(GraphRun::new(uri.clone()));
        let scheduled = self.run_waves(&graph, input, invoker, &run, started);
        let outcome = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, scheduled)
                .await
                .map_err(|_| ()),
            None => Ok(scheduled.await),
        };

        let mut run = run.into_inner();
        run.elapsed = started.elapsed();

        let outputs = match outcome {
            Err(()) => {
                let completed = run.completed();
                warn!(graph = %uri, elapsed = ?run.elapsed, completed = completed.len(), "graph run timed out");
                return Err(GraphError::TimedOut {
                    elapsed: run.elapsed,
                    completed,
                    run: Box::new(run),
                });
            }
            Ok(Err((node, failure))) => {
                let completed = run.completed();
                warn!(graph = %uri, node = %node, error = %failure, "graph run failed");
                return Err(GraphError::NodeFailed {
                    node,
                    failure,
                    completed,
                    run: Box::new(run),
                });
            }
            Ok(Ok(outputs)) => outputs,
        };

        let output = keyed(&graph.sinks, &outputs);
        if let Err(error) = output_schema.validate(&output) {
            warn!(graph = %uri, error = %error, "graph output rejected");
            return Err(GraphError::OutputValidation {
                error,
                run: Box::new(run),
            });
        }

        info!(graph = %uri, elapsed = ?run.elapsed, "graph run finished");
        Ok(GraphOutcome { output, run })
    }

    async fn run_waves(
        &self,
        graph: &ValidatedGraph,
        input: Value,
        invoker: &dyn NodeInvoker,
        run: &Mutex<GraphRun>,
        started: Instant,
    ) -> Result<HashMap<String, Value>, WaveFailure> {
        let mut outputs: HashMap<String, Value> = HashMap::with_capacity(graph.order.len());

        for (index, wave) in graph.waves.iter().enumerate() {
            run.lock().waves.push(wave.clone());
            debug!(wave = index, nodes = ?wave, "dispatching wave");

            let calls: Vec<_> = wave
                .iter()
                .map(|node| {
                    let node_input = match graph.predecessors_of(node) {
                        [] => input.clone(),
                        parents => keyed(parents, &outputs),
                    };
                    async move {
                        let offset = started.elapsed();
                        let result = invoker.invoke(node, node_input).await;
                        let status = match &result {
                            Ok(_) => NodeStatus::Succeeded,
                            Err(failure) => NodeStatus::Failed(failure.to_string()),
                        };
                        run.lock().nodes.push(NodeRecord {
                            node: node.clone(),
                            wave: index,
                            started_after: offset,
                            duration: started.elapsed().saturating_sub(offset),
                            status,
                        });
                        (node.as_str(), result)
                    }
                })
                .collect();

            let results: Vec<(&str, Result<Value, NodeFailure>)> = match self.max_concurrency {
                Some(limit) => {
                    futures::stream::iter(calls)
                        .buffer_unordered(limit)
                        .collect()
                        .await
                }
                None => join_all(calls).await,
            };

            let mut by_node: HashMap<&str, Result<Value, NodeFailure>> =
                results.into_iter().collect();
            let mut first_failure = None;
            for node in wave {
                match by_node.remove(node.as_str()) {
                    Some(Ok(output)) => {
                        outputs.insert(node.clone(), output);
                    }
                    Some(Err(failure)) if first_failure.is_none() => {
                        first_failure = Some((node.clone(), failure));
                    }
                    Some(Err(_)) | None => {}
                }
            }
            if let Some(failure) = first_failure {
                return Err(failure);
            }
        }

        Ok(outputs)
    }
}

fn compile(target: SchemaTarget, schema: &Value) -> Result<SchemaValidator, GraphError> {
    let boundary = match target {
        SchemaTarget::Input => "input",
        _ => "output",
    };
    SchemaValidator::compile(target, schema).map_err(|err| {
        let message = match err {
            PolicyError::InvalidSchema { message, .. } => message,
            other => other.to_string(),
        };
        GraphError::Validation(vec![GraphValidationError::InvalidSchema { boundary, message }])
    })
}

/// A single id passes its output through; several are keyed by id.
fn keyed(ids: &[String], outputs: &HashMap<String, Value>) -> Value {
    match ids {
        [single] => outputs.get(single).cloned().unwrap_or(Value::Null),
        many => Value::Object(
            many.iter()
                .map(|id| (id.clone(), outputs.get(id).cloned().unwrap_or(Value::Null)))
                .collect::<Map<String, Value>>(),
        ),
    }
}
