// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Worker engine main loop (§4.5): register, poll for assignments, run the
//! policy-wrapped step body, report the outcome, heartbeat.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use weft_core::{Assignment, InstanceId, StepReport, WeftError, WorkerId, Workflow, WorkflowKey, WorkflowPolicy};

use crate::client::BrokerClient;
use crate::policy_engine::invoke_step;
use crate::registry::StepRegistry;

/// Drives one worker process's assignment loop against a [`BrokerClient`].
pub struct WorkerEngine<C: BrokerClient> {
    client: Arc<C>,
    workflows: HashMap<WorkflowKey, Workflow>,
    step_registry: StepRegistry,
    workflow_policies: Vec<Arc<dyn WorkflowPolicy>>,
    poll_interval: Duration,
    keep_alive_interval: Duration,
    report_retry_attempts: u32,
    report_retry_wait: Duration,
}

impl<C: BrokerClient> WorkerEngine<C> {
    pub fn new(client: Arc<C>, workflows: Vec<Workflow>, step_registry: StepRegistry) -> Self {
        let workflows =
            workflows.into_iter().map(|w| (WorkflowKey::new(w.workflow_id.clone(), w.version.clone()), w)).collect();
        Self {
            client,
            workflows,
            step_registry,
            workflow_policies: Vec::new(),
            poll_interval: Duration::from_millis(250),
            keep_alive_interval: Duration::from_secs(10),
            report_retry_attempts: 3,
            report_retry_wait: Duration::from_millis(200),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn with_workflow_policies(mut self, policies: Vec<Arc<dyn WorkflowPolicy>>) -> Self {
        self.workflow_policies = policies;
        self
    }

    /// Runs until `shutdown` flips true. Returns the worker's registered id.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<WorkerId, WeftError> {
        let schemas: Vec<Workflow> = self.workflows.values().cloned().collect();
        let (worker_id, _) = self.client.register_worker(schemas).await?;
        info!(worker_id = %worker_id, "worker registered");

        let mut last_keep_alive = Instant::now();
        while !shutdown.load(Ordering::Relaxed) {
            match self.client.get_step(&worker_id).await {
                Ok(Some(assignment)) => {
                    if let Err(e) = self.execute_assignment(&worker_id, assignment).await {
                        error!(error = %e, "failed to report step outcome");
                    }
                }
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    warn!(error = %e, "get_step failed, backing off");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }

            if last_keep_alive.elapsed() >= self.keep_alive_interval {
                if let Err(e) = self.client.keep_alive(&worker_id).await {
                    warn!(error = %e, "keep_alive failed");
                }
                last_keep_alive = Instant::now();
            }
        }
        Ok(worker_id)
    }

    async fn execute_assignment(&self, worker_id: &WorkerId, assignment: Assignment) -> Result<(), WeftError> {
        let Assignment { instance_id, workflow_key, step, inputs, predecessor_results, .. } = assignment;

        let report = match self.workflows.get(&workflow_key) {
            None => StepReport::Failed { error: format!("worker has no definition for workflow '{workflow_key}'") },
            Some(workflow) => {
                let policies = workflow.step(&step).map(|s| s.policies.clone()).unwrap_or_default();
                for wp in &self.workflow_policies {
                    wp.on_step_start(instance_id.as_str(), &step);
                }
                match self.step_registry.lookup(&workflow_key.workflow_id, &step) {
                    None => StepReport::Failed { error: format!("no step body registered for '{step}'") },
                    Some(body) => {
                        match invoke_step(&policies, body, Arc::new(inputs), Arc::new(predecessor_results)).await {
                            Ok(result) => {
                                for wp in &self.workflow_policies {
                                    wp.on_step_success(instance_id.as_str(), &step, &result);
                                }
                                StepReport::Succeeded { result }
                            }
                            Err(error) => {
                                for wp in &self.workflow_policies {
                                    wp.on_step_failure(instance_id.as_str(), &step, &error);
                                }
                                StepReport::Failed { error }
                            }
                        }
                    }
                }
            }
        };

        self.report_with_retry(worker_id, &instance_id, &step, report).await
    }

    /// Worker-level transient (network) failures on the report path get a
    /// bounded retry with backoff before the assignment is abandoned (§7).
    async fn report_with_retry(
        &self,
        worker_id: &WorkerId,
        instance_id: &InstanceId,
        step: &str,
        report: StepReport,
    ) -> Result<(), WeftError> {
        let mut attempt = 0;
        loop {
            match self.client.report_step(worker_id, instance_id, step, report.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.report_retry_attempts => {
                    attempt += 1;
                    warn!(error = %e, attempt, "report_step failed, retrying");
                    tokio::time::sleep(self.report_retry_wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LocalBrokerClient;
    use async_trait::async_trait;
    use serde_json::Value;
    use smol_str::SmolStr;
    use std::collections::HashMap;
    use std::time::Duration;
    use weft_broker::Broker;
    use weft_core::WorkflowId;
    use weft_storage::{InMemoryStore, RuntimeStorage};

    struct Echo;

    #[async_trait]
    impl crate::registry::StepBody for Echo {
        async fn call(&self, inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
            Ok(inputs.get("x").cloned().unwrap_or(Value::Null))
        }
    }

    #[tokio::test]
    async fn worker_engine_drains_a_linear_workflow() {
        let workflow = Workflow::builder("wf", "v1")
            .then("a", weft_core::Action::default_action(), "b")
            .input_keys(["x"])
            .outputs(["b"])
            .build()
            .unwrap();

        let storage = Arc::new(InMemoryStore::new());
        let broker = Arc::new(Broker::new(storage.clone()));
        broker.register_workflow(workflow.clone()).unwrap();
        let key = WorkflowKey::new(WorkflowId::new("wf"), "v1".to_string());
        let instance_id = broker.dispatch(&key, HashMap::from([("x".to_string(), Value::from(7))])).await.unwrap();

        let client = Arc::new(LocalBrokerClient::new(broker));
        let mut registry = StepRegistry::new();
        registry.register("wf", "a", Echo);
        registry.register("wf", "b", Echo);
        let engine = WorkerEngine::new(client, vec![workflow], registry).with_poll_interval(Duration::from_millis(5));

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            shutdown_clone.store(true, Ordering::Relaxed);
        });
        engine.run(shutdown).await.unwrap();

        assert_eq!(storage.get_result(&instance_id, "b").await.unwrap(), Some(Value::from(7)));
        assert_eq!(storage.get_state(&instance_id, "a").await.unwrap(), weft_core::Status::Succeeded);
        assert_eq!(storage.get_state(&instance_id, "b").await.unwrap(), weft_core::Status::Succeeded);
    }
}
