// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! The broker's authoritative scheduling logic (§4.4), storage-backed and
//! generic over [`RuntimeStorage`].

use dashmap::DashMap;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use weft_core::{
    dispatch_instance, on_step_failed, on_step_succeeded, resolve_bindings, Assignment, Clock, Context,
    InputValidationError, Instance, InstanceId, LeaseError, ReadinessEvent, SchemaConflictError, Status, StepReport,
    SystemClock, WeftError, WorkerId, WorkerRegistration, Workflow, WorkflowKey,
};
use weft_storage::RuntimeStorage;

use crate::repository::RepositoryRegistry;

struct WorkerInfo {
    capabilities: Vec<WorkflowKey>,
    connected_at_ms: u64,
    last_seen_ms: u64,
}

#[derive(Clone)]
struct Lease {
    worker_id: WorkerId,
    deadline_ms: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerSummary {
    pub worker_id: WorkerId,
    pub capabilities: Vec<String>,
    pub connected_at_ms: u64,
    pub last_seen_ms: u64,
}

/// The result of `get_step`: either a leased [`Assignment`] or nothing ready.
pub type StepGet = Option<Assignment>;

pub struct Broker<S: RuntimeStorage, C: Clock = SystemClock> {
    storage: Arc<S>,
    clock: C,
    schemas: DashMap<WorkflowKey, Workflow>,
    workers: DashMap<WorkerId, WorkerInfo>,
    instances: DashMap<InstanceId, WorkflowKey>,
    instance_locks: DashMap<InstanceId, Arc<AsyncMutex<()>>>,
    leases: DashMap<(InstanceId, SmolStr), Lease>,
    attempts: DashMap<(InstanceId, SmolStr), u32>,
    pub repository: RepositoryRegistry,
    default_lease: Duration,
    worker_liveness_timeout_ms: u64,
}

impl<S: RuntimeStorage> Broker<S, SystemClock> {
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_clock(storage, SystemClock)
    }
}

impl<S: RuntimeStorage, C: Clock> Broker<S, C> {
    pub fn with_clock(storage: Arc<S>, clock: C) -> Self {
        Self {
            storage,
            clock,
            schemas: DashMap::new(),
            workers: DashMap::new(),
            instances: DashMap::new(),
            instance_locks: DashMap::new(),
            leases: DashMap::new(),
            attempts: DashMap::new(),
            repository: RepositoryRegistry::new(),
            default_lease: Duration::from_secs(30),
            worker_liveness_timeout_ms: 60_000,
        }
    }

    pub fn with_default_lease(mut self, lease: Duration) -> Self {
        self.default_lease = lease;
        self
    }

    fn lock_for(&self, instance: &InstanceId) -> Arc<AsyncMutex<()>> {
        self.instance_locks.entry(*instance).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// §4.4 op 1: register worker + merge workflow schemas into the registry.
    pub async fn register_worker(&self, schemas: Vec<Workflow>) -> Result<(WorkerId, WorkerRegistration), WeftError> {
        let mut keys = Vec::with_capacity(schemas.len());
        for workflow in schemas {
            let key = WorkflowKey::new(workflow.workflow_id.clone(), workflow.version.clone());
            if let Some(existing) = self.schemas.get(&key) {
                if existing.to_schema() != workflow.to_schema() {
                    return Err(SchemaConflictError { workflow_id: key.workflow_id.to_string(), version: key.version }.into());
                }
            } else {
                self.schemas.insert(key.clone(), workflow);
            }
            keys.push(key);
        }
        let worker_id = WorkerId::new();
        let now = self.clock.epoch_ms();
        self.workers.insert(
            worker_id,
            WorkerInfo { capabilities: keys, connected_at_ms: now, last_seen_ms: now },
        );
        info!(worker_id = %worker_id, "worker registered");
        Ok((worker_id, WorkerRegistration { worker_id, capabilities: Vec::new(), registered_at_ms: now }))
    }

    /// Registers a workflow directly without a worker attached — used by the
    /// in-process client and by `/repository/register` (§6).
    pub fn register_workflow(&self, workflow: Workflow) -> Result<(), WeftError> {
        let key = WorkflowKey::new(workflow.workflow_id.clone(), workflow.version.clone());
        if let Some(existing) = self.schemas.get(&key) {
            if existing.to_schema() != workflow.to_schema() {
                return Err(SchemaConflictError { workflow_id: key.workflow_id.to_string(), version: key.version }.into());
            }
            return Ok(());
        }
        self.schemas.insert(key, workflow);
        Ok(())
    }

    pub fn workflow(&self, key: &WorkflowKey) -> Option<Workflow> {
        self.schemas.get(key).map(|w| w.clone())
    }

    pub fn workflows(&self) -> Vec<Workflow> {
        self.schemas.iter().map(|e| e.value().clone()).collect()
    }

    pub fn workers(&self) -> Vec<WorkerSummary> {
        self.workers
            .iter()
            .map(|e| WorkerSummary {
                worker_id: *e.key(),
                capabilities: e.value().capabilities.iter().map(|k| k.to_string()).collect(),
                connected_at_ms: e.value().connected_at_ms,
                last_seen_ms: e.value().last_seen_ms,
            })
            .collect()
    }

    /// §4.4 op 2: dispatch a new instance of `key` with `inputs`.
    pub async fn dispatch(&self, key: &WorkflowKey, inputs: HashMap<String, Value>) -> Result<InstanceId, WeftError> {
        let workflow = match self.schemas.get(key).map(|w| w.clone()) {
            Some(workflow) => workflow,
            None if self.repository.declares(key.workflow_id.as_str()) => {
                return Err(WeftError::RepositoryDeclaredNoSchema(key.workflow_id.to_string(), key.version.clone()));
            }
            None => return Err(WeftError::UnknownWorkflow(key.workflow_id.to_string(), key.version.clone())),
        };

        for required in &workflow.input_keys {
            if !inputs.contains_key(required) {
                return Err(InputValidationError::MissingInput(required.clone()).into());
            }
        }
        for provided in inputs.keys() {
            if !workflow.input_keys.contains(provided) {
                return Err(InputValidationError::UnknownInput(provided.clone()).into());
            }
        }

        let instance_id = InstanceId::new();
        let now = self.clock.epoch_ms();
        let steps: Vec<SmolStr> = workflow.steps.keys().cloned().collect();
        self.storage.create_run(key, &instance_id, &steps, inputs.clone(), now).await?;
        self.instances.insert(instance_id, key.clone());

        let lock = self.lock_for(&instance_id);
        let _guard = lock.lock().await;
        let mut instance = Instance::new(instance_id, key.clone(), inputs, now);
        let events = dispatch_instance(&workflow, &mut instance);
        self.persist_events(&instance_id, &events).await?;
        self.maybe_finalize(&workflow, &instance_id, &instance).await?;
        Ok(instance_id)
    }

    async fn rehydrate(&self, workflow_key: &WorkflowKey, instance_id: &InstanceId) -> Result<Instance, WeftError> {
        let inputs = self.storage.get_inputs(instance_id).await?;
        let mut instance = Instance::new(*instance_id, workflow_key.clone(), inputs, 0);
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

    async fn maybe_finalize(&self, workflow: &Workflow, instance_id: &InstanceId, instance: &Instance) -> Result<(), WeftError> {
        if instance.is_complete(workflow) {
            let status = instance.aggregate_status(workflow);
            let now = self.clock.epoch_ms();
            self.storage.finalize_run(instance_id, status, now).await?;
            info!(instance_id = %instance_id, %status, "instance finalized");
        }
        Ok(())
    }

    /// §4.4 op 3: get the next ready step for `worker_id`, if any.
    pub async fn get_step(&self, worker_id: &WorkerId) -> Result<StepGet, WeftError> {
        if let Some(mut w) = self.workers.get_mut(worker_id) {
            w.last_seen_ms = self.clock.epoch_ms();
        } else {
            return Err(WeftError::UnknownWorker(worker_id.to_string()));
        }

        for entry in self.instances.iter() {
            let instance_id = *entry.key();
            let key = entry.value().clone();
            loop {
                let Some(step) = self.storage.fetch_next(&instance_id).await? else { break };
                let state = self.storage.get_state(&instance_id, &step).await?;
                if state != Status::Pending {
                    continue; // stale queue entry; already handled elsewhere
                }
                let workflow = self.schemas.get(&key).map(|w| w.clone());
                let Some(workflow) = workflow else { continue };
                self.storage.set_state(&instance_id, &step, Status::Running).await?;
                let inputs = self.storage.get_inputs(&instance_id).await?;
                let predecessor_results = self.storage.get_all_results(&instance_id).await?;

                // §4.1/§4.4: assemble the payload by resolving each declared
                // parameter binding to a workflow input or a stored
                // predecessor result. An unresolvable required binding (e.g.
                // one naming a SKIPPED rather than SUCCEEDED predecessor)
                // fails the step immediately instead of leasing it out.
                let dependency_bindings = workflow.step(&step).map(|s| s.dependency_bindings.clone()).unwrap_or_default();
                let assembled = {
                    let ctx = Context::new(&inputs, &predecessor_results);
                    resolve_bindings(&step, &dependency_bindings, &ctx)
                };
                let mut payload_inputs = inputs;
                match assembled {
                    Ok(values) => payload_inputs.extend(values),
                    Err(err) => {
                        warn!(instance_id = %instance_id, %step, %err, "dependency binding unresolved; failing step");
                        let lock = self.lock_for(&instance_id);
                        let _guard = lock.lock().await;
                        let mut failing_instance = self.rehydrate(&key, &instance_id).await?;
                        self.storage.set_state(&instance_id, &step, Status::Failed).await?;
                        let events = on_step_failed(&workflow, &mut failing_instance, &step, err.to_string());
                        self.persist_events(&instance_id, &events).await?;
                        self.maybe_finalize(&workflow, &instance_id, &failing_instance).await?;
                        continue;
                    }
                }

                let lease_seconds = workflow
                    .step(&step)
                    .and_then(|s| {
                        s.policies.iter().find_map(|p| match p {
                            weft_core::StepPolicy::Timeout { seconds } => Some(*seconds),
                            _ => None,
                        })
                    })
                    .unwrap_or(self.default_lease);
                let deadline_ms = self.clock.epoch_ms() + lease_seconds.as_millis() as u64;
                let attempt = *self.attempts.entry((instance_id, step.clone())).or_insert(0);
                self.leases.insert((instance_id, step.clone()), Lease { worker_id: *worker_id, deadline_ms });
                return Ok(Some(Assignment {
                    instance_id,
                    workflow_key: key,
                    step,
                    attempt,
                    inputs: payload_inputs,
                    predecessor_results,
                    lease_deadline_ms: deadline_ms,
                }));
            }
        }
        Ok(None)
    }

    /// §4.4 op 4: apply a worker's report for one leased step.
    pub async fn report_step(&self, worker_id: &WorkerId, instance_id: &InstanceId, step: &str, report: StepReport) -> Result<(), WeftError> {
        let step = SmolStr::new(step);
        let current_state = self.storage.get_state(instance_id, &step).await?;
        if current_state.is_terminal() {
            return Ok(()); // idempotent re-report of a terminal step
        }

        match self.leases.get(&(*instance_id, step.clone())) {
            Some(lease) if lease.worker_id == *worker_id => {}
            Some(_) => return Err(LeaseError::NotHeld(worker_id.to_string(), step.to_string(), instance_id.to_string()).into()),
            None => return Err(LeaseError::Reclaimed(step.to_string(), instance_id.to_string()).into()),
        }
        self.leases.remove(&(*instance_id, step.clone()));

        let key = self
            .instances
            .get(instance_id)
            .map(|e| e.clone())
            .ok_or_else(|| WeftError::UnknownInstance(instance_id.to_string()))?;
        let workflow = self
            .schemas
            .get(&key)
            .map(|w| w.clone())
            .ok_or_else(|| WeftError::UnknownWorkflow(key.workflow_id.to_string(), key.version.clone()))?;

        let lock = self.lock_for(instance_id);
        let _guard = lock.lock().await;
        let mut instance = self.rehydrate(&key, instance_id).await?;

        let events = match report {
            StepReport::Succeeded { result } => {
                self.storage.set_state(instance_id, &step, Status::Succeeded).await?;
                self.storage.set_result(instance_id, &step, result.clone()).await?;
                on_step_succeeded(&workflow, &mut instance, &step, result)
            }
            StepReport::Failed { error } => {
                self.storage.set_state(instance_id, &step, Status::Failed).await?;
                on_step_failed(&workflow, &mut instance, &step, error)
            }
        };
        self.persist_events(instance_id, &events).await?;
        self.maybe_finalize(&workflow, instance_id, &instance).await?;
        Ok(())
    }

    /// §4.4 op 5.
    pub fn keep_alive(&self, worker_id: &WorkerId) -> Result<(), WeftError> {
        match self.workers.get_mut(worker_id) {
            Some(mut w) => {
                w.last_seen_ms = self.clock.epoch_ms();
                Ok(())
            }
            None => Err(WeftError::UnknownWorker(worker_id.to_string())),
        }
    }

    /// §4.4 op 6: reclaim expired leases and drop stale workers.
    pub async fn reap_leases(&self) -> Result<(), WeftError> {
        let now = self.clock.epoch_ms();
        let expired: Vec<(InstanceId, SmolStr)> =
            self.leases.iter().filter(|e| e.value().deadline_ms < now).map(|e| e.key().clone()).collect();
        for (instance_id, step) in expired {
            self.leases.remove(&(instance_id, step.clone()));
            *self.attempts.entry((instance_id, step.clone())).or_insert(0) += 1;
            self.storage.set_state(&instance_id, &step, Status::Pending).await?;
            self.storage.enqueue(&instance_id, &step).await?;
            warn!(instance_id = %instance_id, %step, "lease reclaimed after deadline");
        }

        let stale: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|e| now.saturating_sub(e.value().last_seen_ms) > self.worker_liveness_timeout_ms)
            .map(|e| *e.key())
            .collect();
        for worker_id in stale {
            self.workers.remove(&worker_id);
            let their_leases: Vec<(InstanceId, SmolStr)> =
                self.leases.iter().filter(|e| e.value().worker_id == worker_id).map(|e| e.key().clone()).collect();
            for (instance_id, step) in their_leases {
                self.leases.remove(&(instance_id, step.clone()));
                self.storage.set_state(&instance_id, &step, Status::Pending).await?;
                self.storage.enqueue(&instance_id, &step).await?;
            }
            warn!(worker_id = %worker_id, "worker dropped for liveness timeout");
        }
        Ok(())
    }
}
