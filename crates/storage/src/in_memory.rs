// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! In-memory backend — used by tests and the in-process execution engines.

use crate::record::RunRecord;
use crate::traits::RuntimeStorage;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use weft_core::{InstanceId, Status, StorageError, WorkflowKey};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    runs: Arc<Mutex<HashMap<InstanceId, RunRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_run<T>(&self, instance: &InstanceId, f: impl FnOnce(&mut RunRecord) -> Result<T, StorageError>) -> Result<T, StorageError> {
        let mut runs = self.runs.lock();
        let run = runs
            .get_mut(instance)
            .ok_or_else(|| StorageError(format!("unknown instance '{instance}'")))?;
        f(run)
    }
}

#[async_trait]
impl RuntimeStorage for InMemoryStore {
    async fn create_run(
        &self,
        workflow_key: &WorkflowKey,
        instance: &InstanceId,
        steps: &[SmolStr],
        inputs: HashMap<String, Value>,
        started_at_ms: u64,
    ) -> Result<(), StorageError> {
        self.runs.lock().insert(*instance, RunRecord::new(workflow_key.clone(), steps, inputs, started_at_ms));
        Ok(())
    }

    async fn enqueue(&self, instance: &InstanceId, step: &str) -> Result<(), StorageError> {
        self.with_run(instance, |run| {
            let state = run.step_states.get(step).copied().unwrap_or(Status::Pending);
            if state != Status::Running && !state.is_terminal() && !run.queue.iter().any(|s| s == step) {
                run.queue.push_back(SmolStr::new(step));
            }
            Ok(())
        })
    }

    async fn fetch_next(&self, instance: &InstanceId) -> Result<Option<SmolStr>, StorageError> {
        self.with_run(instance, |run| Ok(run.queue.pop_front()))
    }

    async fn set_state(&self, instance: &InstanceId, step: &str, state: Status) -> Result<(), StorageError> {
        self.with_run(instance, |run| {
            run.step_states.insert(SmolStr::new(step), state);
            Ok(())
        })
    }

    async fn get_state(&self, instance: &InstanceId, step: &str) -> Result<Status, StorageError> {
        self.with_run(instance, |run| Ok(run.step_states.get(step).copied().unwrap_or(Status::Pending)))
    }

    async fn set_inputs(&self, instance: &InstanceId, inputs: HashMap<String, Value>) -> Result<(), StorageError> {
        self.with_run(instance, |run| {
            run.inputs = inputs;
            Ok(())
        })
    }

    async fn get_inputs(&self, instance: &InstanceId) -> Result<HashMap<String, Value>, StorageError> {
        self.with_run(instance, |run| Ok(run.inputs.clone()))
    }

    async fn set_result(&self, instance: &InstanceId, step: &str, result: Value) -> Result<(), StorageError> {
        self.with_run(instance, |run| {
            run.step_results.insert(SmolStr::new(step), result);
            Ok(())
        })
    }

    async fn get_result(&self, instance: &InstanceId, step: &str) -> Result<Option<Value>, StorageError> {
        self.with_run(instance, |run| Ok(run.step_results.get(step).cloned()))
    }

    async fn finalize_run(&self, instance: &InstanceId, status: Status, finished_at_ms: u64) -> Result<(), StorageError> {
        self.with_run(instance, |run| {
            run.final_status = Some(status);
            run.finished_at_ms = Some(finished_at_ms);
            Ok(())
        })
    }

    async fn get_all_states(&self, instance: &InstanceId) -> Result<HashMap<SmolStr, Status>, StorageError> {
        self.with_run(instance, |run| Ok(run.step_states.clone()))
    }

    async fn get_all_results(&self, instance: &InstanceId) -> Result<HashMap<SmolStr, Value>, StorageError> {
        self.with_run(instance, |run| Ok(run.step_results.clone()))
    }

    async fn workflow_key(&self, instance: &InstanceId) -> Result<WorkflowKey, StorageError> {
        self.with_run(instance, |run| Ok(run.workflow_key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_next_is_fifo_and_drains() {
        let store = InMemoryStore::new();
        let instance = InstanceId::new();
        let key = WorkflowKey::new("wf", "v1");
        store.create_run(&key, &instance, &[SmolStr::new("a"), SmolStr::new("b")], HashMap::new(), 0).await.unwrap();
        store.enqueue(&instance, "a").await.unwrap();
        store.enqueue(&instance, "b").await.unwrap();
        assert_eq!(store.fetch_next(&instance).await.unwrap(), Some(SmolStr::new("a")));
        assert_eq!(store.fetch_next(&instance).await.unwrap(), Some(SmolStr::new("b")));
        assert_eq!(store.fetch_next(&instance).await.unwrap(), None);
    }

    #[tokio::test]
    async fn enqueue_skips_running_or_terminal_steps() {
        let store = InMemoryStore::new();
        let instance = InstanceId::new();
        let key = WorkflowKey::new("wf", "v1");
        store.create_run(&key, &instance, &[SmolStr::new("a")], HashMap::new(), 0).await.unwrap();
        store.set_state(&instance, "a", Status::Running).await.unwrap();
        store.enqueue(&instance, "a").await.unwrap();
        assert_eq!(store.fetch_next(&instance).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_instance_errors() {
        let store = InMemoryStore::new();
        let err = store.get_state(&InstanceId::new(), "a").await.unwrap_err();
        assert!(err.0.contains("unknown instance"));
    }
}
