//! Example IP check CLI.
//!
//! Runs one IP through every execution mode: the allow-list locally and as a
//! deployed function, the reputation rule remotely and as a job, and finally
//! the `ip-check` graph.
//!
//! # Usage
//!
//! ```bash
//! ip-check <ip>
//! ```
//!
//! # Example
//!
//! ```bash
//! PRAETOR_LOG=info ip-check 10.0.0.1
//! ```

use std::sync::Arc;

use example::{ALLOWLIST, IP_CHECK, IpChecksPlugin, REPUTATION, ip_check_graph, register_rules};
use praetor_core_plugins::{ConfigPlugin, DefaultPlugins};
use praetor_executors::{ExecutorStatus, ExecutorsPlugin, PolicyExecutor};
use praetor_graph::GraphPlugin;
use praetor_policy::prelude::*;
use praetor_runtime::{Dispatcher, ExecutionRequest, FunctionDeployment, RuntimePlugin};
use praetor_system::plugin::PluginGroup;
use praetor_system::server::Server;
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: <ip>");
        eprintln!("Example: 10.0.0.1");
        std::process::exit(1);
    }
    let ip = args[1].clone();

    let config = ConfigPlugin::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let graph = ip_check_graph().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let rules = Arc::new(InMemoryPolicyStore::new());
    let code = Arc::new(InMemoryCodeStore::new());
    if let Err(e) = register_rules(&rules, &code) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    // Initialize server with plugins
    let mut server = Server::new();
    server
        .add_plugins(DefaultPlugins.build().set(config))
        .add_plugins(PoliciesPlugin::new(rules, code))
        .add_plugins(IpChecksPlugin)
        .add_plugins(ExecutorsPlugin::new().with_executor(
            PolicyExecutor::new("executor-001", "http://127.0.0.1:8080")
                .with_status(ExecutorStatus::Healthy),
        ))
        .add_plugins(GraphPlugin)
        .add_plugins(RuntimePlugin::new().with_loopback().with_graph(graph));
    server.finish();

    let Some(dispatcher) = server.global::<Dispatcher>() else {
        eprintln!("Error: dispatcher not installed");
        std::process::exit(1);
    };

    if let Err(e) = run(&dispatcher, &ip).await {
        eprintln!("Error: {e}");
        server.cleanup();
        std::process::exit(1);
    }
    server.cleanup();
}

async fn run(dispatcher: &Dispatcher, ip: &str) -> Result<(), praetor_runtime::DispatchError> {
    let input = json!({ "ip": ip });

    let local = dispatcher
        .execute(ExecutionRequest::local(ALLOWLIST, input.clone()))
        .await?;
    info!(output = ?local.output(), "local");

    let remote = dispatcher
        .execute(ExecutionRequest::remote(REPUTATION, input.clone()).with_executor("executor-001"))
        .await?;
    info!(output = ?remote.output(), "remote");

    if let Some(handle) = dispatcher
        .execute(ExecutionRequest::job(REPUTATION, input.clone()).with_executor("executor-001"))
        .await?
        .job()
    {
        let job = dispatcher.jobs().wait(&handle.job_id).await?;
        info!(job_id = %job.job_id, status = ?job.status, result = ?job.result, "job");
    }

    let roles = [
        ("funcA", "normalise", None),
        ("funcB", "check", None),
        ("funcC", "check", Some(json!(["10.0.0.1"]))),
        ("funcD", "combine", None),
    ];
    for (function_id, role, allowlist) in roles {
        let mut overrides = Overrides::none().with_settings(settings(role));
        if let Some(allowlist) = allowlist {
            let mut parameters = JsonMap::new();
            parameters.insert("allowlist".into(), allowlist);
            overrides = overrides.with_parameters(parameters);
        }
        dispatcher
            .functions()
            .deploy_function(
                FunctionDeployment::new(function_id, ALLOWLIST.parse::<PolicyRuleUri>()?)
                    .with_executor("executor-001")
                    .with_overrides(overrides),
            )
            .await?;
    }

    let function = dispatcher
        .execute(ExecutionRequest::function("funcB", input.clone()))
        .await?;
    info!(output = ?function.output(), "function");

    let graph = dispatcher
        .execute(ExecutionRequest::graph(IP_CHECK, input))
        .await?;
    info!(output = ?graph.output(), "graph");
    Ok(())
}

fn settings(role: &str) -> JsonMap {
    let mut settings = JsonMap::new();
    settings.insert("role".into(), json!(role));
    settings
}
