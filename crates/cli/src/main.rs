// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! `weft` — admin CLI against a broker's HTTP surface, plus a worker-process
//! entry point (§6).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use weft_cli::AdminClient;
use weft_worker::{HttpBrokerClient, StepRegistry, WorkerEngine};

#[derive(Parser)]
#[command(name = "weft", about = "Workflow orchestrator admin CLI and worker runner")]
struct Cli {
    /// Broker base URL; falls back to $BROKER_URL, then http://127.0.0.1:8080.
    #[arg(long, global = true)]
    broker_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the broker's liveness status.
    Status,
    /// List registered workers.
    Workers,
    /// List registered workflow schemas.
    Workflows,
    /// Dispatch a new instance of a registered workflow.
    Dispatch {
        workflow_id: String,
        version: String,
        /// Input bindings as `key=json_value`, e.g. `x=5` or `name='"bob"'`.
        #[arg(value_name = "KEY=VALUE")]
        inputs: Vec<String>,
    },
    /// Run a worker process against `<module>:<object>`'s step registry.
    ///
    /// Rust binaries are statically linked, so there is no runtime import of
    /// a `<module>:<object>` path; the target is resolved against a small
    /// table of registries compiled into this binary. Applications that need
    /// their own step bodies should embed [`weft_cli::run_worker_processes`]
    /// in their own binary (see `weft-demo-calc`) instead of going through
    /// this command.
    Worker {
        /// `<module>:<object>` target, e.g. `weft.examples:echo`.
        target: String,
    },
}

fn broker_url(cli_value: Option<String>) -> String {
    cli_value
        .or_else(|| std::env::var("BROKER_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:8080".to_string())
}

fn parse_inputs(pairs: &[String]) -> Result<HashMap<String, Value>> {
    let mut inputs = HashMap::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got '{pair}'"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(key.to_string(), value);
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let url = broker_url(cli.broker_url);

    match cli.command {
        Command::Status => {
            let body = AdminClient::new(url).status().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Workers => {
            let body = AdminClient::new(url).workers().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Workflows => {
            let body = AdminClient::new(url).workflows().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Dispatch { workflow_id, version, inputs } => {
            let inputs = parse_inputs(&inputs)?;
            let instance_id = AdminClient::new(url).dispatch(&workflow_id, &version, inputs).await?;
            println!("{instance_id}");
        }
        Command::Worker { target } => {
            let worker_processes: usize =
                std::env::var("WORKER_PROCESSES").ok().and_then(|v| v.parse().ok()).unwrap_or(1);
            let exit_code = run_worker_target(&url, &target, worker_processes).await?;
            std::process::exit(exit_code);
        }
    }
    Ok(())
}

/// The one built-in worker target: an echo step body useful for smoke-testing
/// a broker deployment without writing a custom worker binary.
async fn run_worker_target(url: &str, target: &str, worker_processes: usize) -> Result<i32> {
    let Some((workflow_id, step)) = target.split_once(':') else {
        bail!("expected <module>:<object>, got '{target}'");
    };
    if workflow_id != "weft.examples" || step != "echo" {
        bail!("unknown worker target '{target}'; embed weft_cli::run_worker_processes in your own binary instead");
    }

    let client = Arc::new(HttpBrokerClient::new(url));
    let mut registry = StepRegistry::new();
    registry.register("weft.examples", "echo", |inputs: HashMap<String, Value>, _preds| async move {
        Ok(inputs.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null))
    });

    let exit_code = weft_cli::run_worker_processes(
        move || WorkerEngine::new(client.clone(), Vec::new(), registry.clone()),
        worker_processes,
    )
    .await;
    Ok(exit_code)
}
