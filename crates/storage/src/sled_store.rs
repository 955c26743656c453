// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Persistent backend on top of `sled`, gated behind the `persistent` feature.
//!
//! Each instance's [`RunRecord`] is a single JSON-encoded value keyed by its
//! `instance_id`. `fetch_next` uses sled's compare-and-swap to pop the queue
//! head, so two workers racing `fetch_next` against the same tree never both
//! win: the loser's CAS fails and retries against the value the winner just
//! wrote.

use crate::record::RunRecord;
use crate::traits::RuntimeStorage;
use async_trait::async_trait;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use weft_core::{InstanceId, Status, StorageError, WorkflowKey};

pub struct SledStore {
    tree: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| StorageError(e.to_string()))?;
        Ok(Self { tree: db.open_tree("weft_runs").map_err(|e| StorageError(e.to_string()))? })
    }

    fn read(&self, instance: &InstanceId) -> Result<RunRecord, StorageError> {
        let bytes = self
            .tree
            .get(instance.as_str())
            .map_err(|e| StorageError(e.to_string()))?
            .ok_or_else(|| StorageError(format!("unknown instance '{instance}'")))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError(e.to_string()))
    }

    /// Compare-and-swap loop applying `f` to the current record.
    fn mutate<T>(&self, instance: &InstanceId, mut f: impl FnMut(&mut RunRecord) -> Result<T, StorageError>) -> Result<T, StorageError> {
        loop {
            let old_bytes = self
                .tree
                .get(instance.as_str())
                .map_err(|e| StorageError(e.to_string()))?
                .ok_or_else(|| StorageError(format!("unknown instance '{instance}'")))?;
            let mut run: RunRecord = serde_json::from_slice(&old_bytes).map_err(|e| StorageError(e.to_string()))?;
            let result = f(&mut run)?;
            let new_bytes = serde_json::to_vec(&run).map_err(|e| StorageError(e.to_string()))?;
            match self.tree.compare_and_swap(instance.as_str(), Some(old_bytes.as_ref()), Some(new_bytes)) {
                Ok(Ok(())) => return Ok(result),
                Ok(Err(_)) => continue, // lost the race; retry against the fresh value
                Err(e) => return Err(StorageError(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl RuntimeStorage for SledStore {
    async fn create_run(
        &self,
        workflow_key: &WorkflowKey,
        instance: &InstanceId,
        steps: &[SmolStr],
        inputs: HashMap<String, Value>,
        started_at_ms: u64,
    ) -> Result<(), StorageError> {
        let run = RunRecord::new(workflow_key.clone(), steps, inputs, started_at_ms);
        let bytes = serde_json::to_vec(&run).map_err(|e| StorageError(e.to_string()))?;
        self.tree.insert(instance.as_str(), bytes).map_err(|e| StorageError(e.to_string()))?;
        Ok(())
    }

    async fn enqueue(&self, instance: &InstanceId, step: &str) -> Result<(), StorageError> {
        self.mutate(instance, |run| {
            let state = run.step_states.get(step).copied().unwrap_or(Status::Pending);
            if state != Status::Running && !state.is_terminal() && !run.queue.iter().any(|s| s == step) {
                run.queue.push_back(SmolStr::new(step));
            }
            Ok(())
        })
    }

    async fn fetch_next(&self, instance: &InstanceId) -> Result<Option<SmolStr>, StorageError> {
        self.mutate(instance, |run| Ok(run.queue.pop_front()))
    }

    async fn set_state(&self, instance: &InstanceId, step: &str, state: Status) -> Result<(), StorageError> {
        self.mutate(instance, |run| {
            run.step_states.insert(SmolStr::new(step), state);
            Ok(())
        })
    }

    async fn get_state(&self, instance: &InstanceId, step: &str) -> Result<Status, StorageError> {
        Ok(self.read(instance)?.step_states.get(step).copied().unwrap_or(Status::Pending))
    }

    async fn set_inputs(&self, instance: &InstanceId, inputs: HashMap<String, Value>) -> Result<(), StorageError> {
        self.mutate(instance, |run| {
            run.inputs = inputs.clone();
            Ok(())
        })
    }

    async fn get_inputs(&self, instance: &InstanceId) -> Result<HashMap<String, Value>, StorageError> {
        Ok(self.read(instance)?.inputs)
    }

    async fn set_result(&self, instance: &InstanceId, step: &str, result: Value) -> Result<(), StorageError> {
        self.mutate(instance, |run| {
            run.step_results.insert(SmolStr::new(step), result.clone());
            Ok(())
        })
    }

    async fn get_result(&self, instance: &InstanceId, step: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read(instance)?.step_results.get(step).cloned())
    }

    async fn finalize_run(&self, instance: &InstanceId, status: Status, finished_at_ms: u64) -> Result<(), StorageError> {
        self.mutate(instance, |run| {
            run.final_status = Some(status);
            run.finished_at_ms = Some(finished_at_ms);
            Ok(())
        })
    }

    async fn get_all_states(&self, instance: &InstanceId) -> Result<HashMap<SmolStr, Status>, StorageError> {
        Ok(self.read(instance)?.step_states)
    }

    async fn get_all_results(&self, instance: &InstanceId) -> Result<HashMap<SmolStr, Value>, StorageError> {
        Ok(self.read(instance)?.step_results)
    }

    async fn workflow_key(&self, instance: &InstanceId) -> Result<WorkflowKey, StorageError> {
        Ok(self.read(instance)?.workflow_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let instance = InstanceId::new();
        let key = WorkflowKey::new("wf", "v1");
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.create_run(&key, &instance, &[SmolStr::new("a")], HashMap::new(), 0).await.unwrap();
            store.enqueue(&instance, "a").await.unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.fetch_next(&instance).await.unwrap(), Some(SmolStr::new("a")));
    }

    #[tokio::test]
    async fn concurrent_fetch_next_never_double_delivers() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(SledStore::open(dir.path()).unwrap());
        let instance = InstanceId::new();
        let key = WorkflowKey::new("wf", "v1");
        let steps: Vec<SmolStr> = (0..20).map(|i| SmolStr::new(format!("s{i}"))).collect();
        store.create_run(&key, &instance, &steps, HashMap::new(), 0).await.unwrap();
        for s in &steps {
            store.enqueue(&instance, s).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(s) = store.fetch_next(&instance).await.unwrap() {
                    got.push(s);
                }
                got
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort();
        let mut expected = steps.clone();
        expected.sort();
        assert_eq!(all, expected);
    }
}
