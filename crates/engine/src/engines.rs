// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! The three in-process execution engines (§4.6). All three share
//! [`GraphDriver`] and differ only in how concurrently they pull ready steps.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use weft_core::{Clock, InstanceId, Status, SystemClock, WeftError};
use weft_storage::RuntimeStorage;

use crate::driver::GraphDriver;

/// Re-panics on a task panic (there is no meaningful `WeftError` for it);
/// `JoinSet` never reports cancellation here since nothing aborts a task.
fn join_step_task(result: Result<Result<(), WeftError>, tokio::task::JoinError>) -> Result<(), WeftError> {
    result.unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))
}

/// Drives a graph one ready step at a time, single-threaded; used by the
/// default `run()` entry point.
pub struct SerialEngine<S: RuntimeStorage, C: Clock = SystemClock> {
    driver: Arc<GraphDriver<S, C>>,
}

impl<S: RuntimeStorage, C: Clock> SerialEngine<S, C> {
    pub fn new(driver: Arc<GraphDriver<S, C>>) -> Self {
        Self { driver }
    }

    pub async fn run(&self, instance_id: &InstanceId) -> Result<Status, WeftError> {
        while let Some(step) = self.driver.fetch_ready(instance_id).await? {
            self.driver.run_ready_step(instance_id, &step).await?;
        }
        self.driver.aggregate_status(instance_id).await
    }
}

/// Maintains `concurrency` cooperative workers against the shared queue;
/// independent ready steps execute concurrently, bounded by a semaphore.
pub struct PoolEngine<S: RuntimeStorage, C: Clock = SystemClock> {
    driver: Arc<GraphDriver<S, C>>,
    concurrency: usize,
}

impl<S: RuntimeStorage, C: Clock> PoolEngine<S, C> {
    pub fn new(driver: Arc<GraphDriver<S, C>>, concurrency: usize) -> Self {
        Self { driver, concurrency: concurrency.max(1) }
    }

    pub async fn run(&self, instance_id: &InstanceId) -> Result<Status, WeftError>
    where
        S: 'static,
        C: 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<(), WeftError>> = JoinSet::new();
        loop {
            while let Some(step) = self.driver.fetch_ready(instance_id).await? {
                let permit = semaphore.clone().acquire_owned().await.unwrap_or_else(|_| unreachable!("semaphore is never closed"));
                let driver = self.driver.clone();
                let instance_id = *instance_id;
                tasks.spawn(async move {
                    let _permit = permit;
                    driver.run_ready_step(&instance_id, &step).await
                });
            }
            if self.driver.is_instance_complete(instance_id).await? {
                break;
            }
            match tasks.join_next().await {
                Some(result) => join_step_task(result)?,
                None => tokio::task::yield_now().await,
            }
        }
        while let Some(result) = tasks.join_next().await {
            join_step_task(result)?;
        }
        self.driver.aggregate_status(instance_id).await
    }
}

/// Spawns one task per ready step with no concurrency cap; fan-out is
/// bounded only by readiness itself.
pub struct AsyncEngine<S: RuntimeStorage, C: Clock = SystemClock> {
    driver: Arc<GraphDriver<S, C>>,
}

impl<S: RuntimeStorage, C: Clock> AsyncEngine<S, C> {
    pub fn new(driver: Arc<GraphDriver<S, C>>) -> Self {
        Self { driver }
    }

    pub async fn run(&self, instance_id: &InstanceId) -> Result<Status, WeftError>
    where
        S: 'static,
        C: 'static,
    {
        let mut tasks: JoinSet<Result<(), WeftError>> = JoinSet::new();
        loop {
            while let Some(step) = self.driver.fetch_ready(instance_id).await? {
                let driver = self.driver.clone();
                let instance_id = *instance_id;
                tasks.spawn(async move { driver.run_ready_step(&instance_id, &step).await });
            }
            if self.driver.is_instance_complete(instance_id).await? {
                break;
            }
            match tasks.join_next().await {
                Some(result) => join_step_task(result)?,
                None => tokio::task::yield_now().await,
            }
        }
        while let Some(result) = tasks.join_next().await {
            join_step_task(result)?;
        }
        self.driver.aggregate_status(instance_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StepRegistry;
    use async_trait::async_trait;
    use serde_json::Value;
    use smol_str::SmolStr;
    use std::collections::HashMap;
    use std::time::Duration;
    use weft_core::{Action, Workflow};
    use weft_storage::InMemoryStore;

    struct Echo;

    #[async_trait]
    impl crate::registry::StepBody for Echo {
        async fn call(&self, inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
            Ok(inputs.get("x").cloned().unwrap_or(Value::Null))
        }
    }

    struct SleepAndEcho(Duration);

    #[async_trait]
    impl crate::registry::StepBody for SleepAndEcho {
        async fn call(&self, _inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
            tokio::time::sleep(self.0).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn serial_engine_drains_a_linear_chain() {
        let workflow = Workflow::builder("wf", "v1")
            .then("a", Action::default_action(), "b")
            .input_keys(["x"])
            .build()
            .unwrap();
        let mut registry = StepRegistry::new();
        registry.register("a", Echo);
        registry.register("b", Echo);
        let driver = Arc::new(GraphDriver::new(Arc::new(InMemoryStore::new()), workflow, registry));
        let instance_id = driver.dispatch(HashMap::from([("x".to_string(), Value::from(5))])).await.unwrap();

        let status = SerialEngine::new(driver).run(&instance_id).await.unwrap();
        assert_eq!(status, Status::Succeeded);
    }

    #[tokio::test]
    async fn pool_engine_runs_independent_branches_concurrently() {
        let mut b = Workflow::builder("wf", "v1");
        b = b.then("a", Action::default_action(), "b");
        b = b.then("a", Action::default_action(), "c");
        let workflow = b.build().unwrap();

        let mut registry = StepRegistry::new();
        registry.register("a", Echo);
        registry.register("b", SleepAndEcho(Duration::from_millis(80)));
        registry.register("c", SleepAndEcho(Duration::from_millis(80)));
        let driver = Arc::new(GraphDriver::new(Arc::new(InMemoryStore::new()), workflow, registry));
        let instance_id = driver.dispatch(HashMap::new()).await.unwrap();

        let start = std::time::Instant::now();
        let status = PoolEngine::new(driver, 2).run(&instance_id).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(status, Status::Succeeded);
        assert!(elapsed < Duration::from_millis(150), "branches should overlap, took {elapsed:?}");
    }

    #[tokio::test]
    async fn async_engine_drains_a_fork_join_graph() {
        let mut b = Workflow::builder("wf", "v1");
        b = b.then("a", Action::default_action(), "b");
        b = b.then("a", Action::default_action(), "c");
        b = b.then("b", Action::default_action(), "d");
        b = b.then("c", Action::default_action(), "d");
        let workflow = b.build().unwrap();

        let mut registry = StepRegistry::new();
        registry.register("a", Echo);
        registry.register("b", Echo);
        registry.register("c", Echo);
        registry.register("d", Echo);
        let driver = Arc::new(GraphDriver::new(Arc::new(InMemoryStore::new()), workflow, registry));
        let instance_id = driver.dispatch(HashMap::new()).await.unwrap();

        let status = AsyncEngine::new(driver).run(&instance_id).await.unwrap();
        assert_eq!(status, Status::Succeeded);
    }
}
