// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! The pluggable runtime storage contract (§4.3).

use async_trait::async_trait;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use weft_core::{InstanceId, Status, StorageError, WorkflowKey};

/// Persistence of per-instance queues, step states, inputs and results.
///
/// Backends must guarantee [`RuntimeStorage::fetch_next`] is atomic across
/// concurrent callers — no two callers may ever dequeue the same step of the
/// same instance — and that `set_state`/`set_result`/`set_inputs` are
/// serialized per `(instance, step)` so a reader never observes a torn
/// write.
#[async_trait]
pub trait RuntimeStorage: Send + Sync + 'static {
    /// Initializes all of `steps` to `PENDING`, empties the queue, records `inputs`.
    async fn create_run(
        &self,
        workflow_key: &WorkflowKey,
        instance: &InstanceId,
        steps: &[SmolStr],
        inputs: HashMap<String, Value>,
        started_at_ms: u64,
    ) -> Result<(), StorageError>;

    /// Appends `step` to the instance's FIFO unless it is already `RUNNING` or terminal.
    async fn enqueue(&self, instance: &InstanceId, step: &str) -> Result<(), StorageError>;

    /// Pops the head of the FIFO; `None` when empty.
    async fn fetch_next(&self, instance: &InstanceId) -> Result<Option<SmolStr>, StorageError>;

    async fn set_state(&self, instance: &InstanceId, step: &str, state: Status) -> Result<(), StorageError>;
    async fn get_state(&self, instance: &InstanceId, step: &str) -> Result<Status, StorageError>;

    async fn set_inputs(&self, instance: &InstanceId, inputs: HashMap<String, Value>) -> Result<(), StorageError>;
    async fn get_inputs(&self, instance: &InstanceId) -> Result<HashMap<String, Value>, StorageError>;

    async fn set_result(&self, instance: &InstanceId, step: &str, result: Value) -> Result<(), StorageError>;
    async fn get_result(&self, instance: &InstanceId, step: &str) -> Result<Option<Value>, StorageError>;

    /// Writes the workflow-level terminal state and `finished_at`.
    async fn finalize_run(&self, instance: &InstanceId, status: Status, finished_at_ms: u64) -> Result<(), StorageError>;

    /// Every step's current state, for rebuilding evaluation state (not part
    /// of the §4.3 contract proper, but needed by the broker/engines to
    /// recompute readiness without replaying history).
    async fn get_all_states(&self, instance: &InstanceId) -> Result<HashMap<SmolStr, Status>, StorageError>;

    async fn get_all_results(&self, instance: &InstanceId) -> Result<HashMap<SmolStr, Value>, StorageError>;

    async fn workflow_key(&self, instance: &InstanceId) -> Result<WorkflowKey, StorageError>;
}
