// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! `GraphDriver` (§4.6): drives one [`Workflow`] directly against a
//! [`RuntimeStorage`] backend, short-circuiting the broker. Shared by
//! [`crate::SerialEngine`], [`crate::PoolEngine`], and [`crate::AsyncEngine`]
//! — they differ only in how they pull ready steps off the queue.

use dashmap::DashMap;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;
use weft_core::{
    dispatch_instance, on_step_failed, on_step_succeeded, resolve_bindings, Clock, Context, InputValidationError,
    Instance, InstanceId, ReadinessEvent, Status, StepPolicy, SystemClock, WeftError, Workflow, WorkflowKey,
};
use weft_storage::RuntimeStorage;

use crate::policy_engine::invoke_step;
use crate::registry::StepRegistry;

pub struct GraphDriver<S: RuntimeStorage, C: Clock = SystemClock> {
    pub(crate) storage: Arc<S>,
    workflow: Workflow,
    registry: StepRegistry,
    clock: C,
    instance_locks: DashMap<InstanceId, Arc<AsyncMutex<()>>>,
}

impl<S: RuntimeStorage> GraphDriver<S, SystemClock> {
    pub fn new(storage: Arc<S>, workflow: Workflow, registry: StepRegistry) -> Self {
        Self::with_clock(storage, workflow, registry, SystemClock)
    }
}

impl<S: RuntimeStorage, C: Clock> GraphDriver<S, C> {
    pub fn with_clock(storage: Arc<S>, workflow: Workflow, registry: StepRegistry, clock: C) -> Self {
        Self { storage, workflow, registry, clock, instance_locks: DashMap::new() }
    }

    pub fn key(&self) -> WorkflowKey {
        WorkflowKey::new(self.workflow.workflow_id.clone(), self.workflow.version.clone())
    }

    fn lock_for(&self, instance_id: &InstanceId) -> Arc<AsyncMutex<()>> {
        self.instance_locks.entry(*instance_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Creates a new instance and seeds its queue with the workflow's roots.
    pub async fn dispatch(&self, inputs: HashMap<String, Value>) -> Result<InstanceId, WeftError> {
        for required in &self.workflow.input_keys {
            if !inputs.contains_key(required) {
                return Err(InputValidationError::MissingInput(required.clone()).into());
            }
        }
        for provided in inputs.keys() {
            if !self.workflow.input_keys.contains(provided) {
                return Err(InputValidationError::UnknownInput(provided.clone()).into());
            }
        }

        let instance_id = InstanceId::new();
        let now = self.clock.epoch_ms();
        let steps: Vec<SmolStr> = self.workflow.steps.keys().cloned().collect();
        let key = self.key();
        self.storage.create_run(&key, &instance_id, &steps, inputs.clone(), now).await?;

        let lock = self.lock_for(&instance_id);
        let _guard = lock.lock().await;
        let mut instance = Instance::new(instance_id, key, inputs, now);
        let events = dispatch_instance(&self.workflow, &mut instance);
        self.persist_events(&instance_id, &events).await?;
        self.maybe_finalize(&instance_id, &instance).await?;
        Ok(instance_id)
    }

    /// Pops the next step whose storage state is still `Pending`, marks it
    /// `Running`, and returns it; `None` once the queue is drained. Mirrors
    /// the broker's `get_step` loop (§4.4 op 3) without the leasing step.
    pub async fn fetch_ready(&self, instance_id: &InstanceId) -> Result<Option<SmolStr>, WeftError> {
        loop {
            let Some(step) = self.storage.fetch_next(instance_id).await? else { return Ok(None) };
            if self.storage.get_state(instance_id, &step).await? != Status::Pending {
                continue;
            }
            self.storage.set_state(instance_id, &step, Status::Running).await?;
            return Ok(Some(step));
        }
    }

    /// Runs one already-`Running` step's body under its policies, applies
    /// the readiness transition, and persists the resulting events.
    pub async fn run_ready_step(&self, instance_id: &InstanceId, step: &str) -> Result<(), WeftError> {
        let inputs = self.storage.get_inputs(instance_id).await?;
        let predecessor_results = self.storage.get_all_results(instance_id).await?;
        let policies: Vec<StepPolicy> = self.workflow.step(step).map(|s| s.policies.clone()).unwrap_or_default();

        // §4.1/§4.4: assemble the payload from this step's declared
        // bindings before invoking its body; an unresolvable required
        // binding fails the step the same way a body error would.
        let dependency_bindings = self.workflow.step(step).map(|s| s.dependency_bindings.clone()).unwrap_or_default();
        let assembled = {
            let ctx = Context::new(&inputs, &predecessor_results);
            resolve_bindings(step, &dependency_bindings, &ctx)
        };

        let outcome = match assembled {
            Err(err) => Err(err.to_string()),
            Ok(values) => {
                let mut payload_inputs = inputs;
                payload_inputs.extend(values);
                match self.registry.lookup(step) {
                    Some(body) => invoke_step(&policies, body, Arc::new(payload_inputs), Arc::new(predecessor_results)).await,
                    None => Err(format!("no step body registered for '{step}'")),
                }
            }
        };

        let lock = self.lock_for(instance_id);
        let _guard = lock.lock().await;
        let mut instance = self.rehydrate(instance_id).await?;
        let events = match outcome {
            Ok(result) => {
                self.storage.set_state(instance_id, step, Status::Succeeded).await?;
                self.storage.set_result(instance_id, step, result.clone()).await?;
                on_step_succeeded(&self.workflow, &mut instance, step, result)
            }
            Err(error) => {
                self.storage.set_state(instance_id, step, Status::Failed).await?;
                on_step_failed(&self.workflow, &mut instance, step, error)
            }
        };
        self.persist_events(instance_id, &events).await?;
        self.maybe_finalize(instance_id, &instance).await?;
        Ok(())
    }

    pub async fn is_instance_complete(&self, instance_id: &InstanceId) -> Result<bool, WeftError> {
        let states = self.storage.get_all_states(instance_id).await?;
        Ok(self.workflow.steps.keys().all(|name| states.get(name).map(|s| s.is_terminal()).unwrap_or(false)))
    }

    pub async fn aggregate_status(&self, instance_id: &InstanceId) -> Result<Status, WeftError> {
        let states = self.storage.get_all_states(instance_id).await?;
        Ok(Status::aggregate(self.workflow.steps.keys().map(|name| states.get(name).unwrap_or(&Status::Pending))))
    }

    async fn rehydrate(&self, instance_id: &InstanceId) -> Result<Instance, WeftError> {
        let inputs = self.storage.get_inputs(instance_id).await?;
        let mut instance = Instance::new(*instance_id, self.key(), inputs, 0);
        instance.step_states = self.storage.get_all_states(instance_id).await?;
        instance.step_results = self.storage.get_all_results(instance_id).await?;
        Ok(instance)
    }

    async fn persist_events(&self, instance_id: &InstanceId, events: &[ReadinessEvent]) -> Result<(), WeftError> {
        for event in events {
            match event {
                ReadinessEvent::Enqueued(step) => self.storage.enqueue(instance_id, step).await?,
                ReadinessEvent::Skipped(step) => self.storage.set_state(instance_id, step, Status::Skipped).await?,
                ReadinessEvent::Cancelled(step) => self.storage.set_state(instance_id, step, Status::Cancelled).await?,
            }
        }
        Ok(())
    }

    async fn maybe_finalize(&self, instance_id: &InstanceId, instance: &Instance) -> Result<(), WeftError> {
        if instance.is_complete(&self.workflow) {
            let status = instance.aggregate_status(&self.workflow);
            let now = self.clock.epoch_ms();
            self.storage.finalize_run(instance_id, status, now).await?;
            info!(instance_id = %instance_id, %status, "instance finalized");
        }
        Ok(())
    }
}
