// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Step bodies: the user-supplied logic a worker actually executes for each
//! step name, looked up by `(workflow_id, step)` at assignment time.

use async_trait::async_trait;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use weft_core::WorkflowId;

/// A single step's runnable logic. Implementors receive `inputs` — the
/// workflow's declared inputs overlaid with this step's resolved dependency
/// bindings (§4.1), assembled by the broker before the assignment is leased
/// out — and the raw predecessor results (§4.5 op 3), returning a result
/// value or an error string that becomes `StepReport::Failed`.
#[async_trait]
pub trait StepBody: Send + Sync {
    async fn call(
        &self,
        inputs: &HashMap<String, Value>,
        predecessor_results: &HashMap<SmolStr, Value>,
    ) -> Result<Value, String>;
}

#[async_trait]
impl<F, Fut> StepBody for F
where
    F: Fn(HashMap<String, Value>, HashMap<SmolStr, Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, String>> + Send,
{
    async fn call(
        &self,
        inputs: &HashMap<String, Value>,
        predecessor_results: &HashMap<SmolStr, Value>,
    ) -> Result<Value, String> {
        (self)(inputs.clone(), predecessor_results.clone()).await
    }
}

/// Maps `(workflow_id, step name)` to the [`StepBody`] a worker runs for it.
/// A worker only needs bodies for the steps of the workflows it registers.
#[derive(Default, Clone)]
pub struct StepRegistry {
    bodies: HashMap<(WorkflowId, SmolStr), Arc<dyn StepBody>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow_id: impl Into<WorkflowId>, step: impl Into<SmolStr>, body: impl StepBody + 'static) -> &mut Self {
        self.bodies.insert((workflow_id.into(), step.into()), Arc::new(body));
        self
    }

    pub fn lookup(&self, workflow_id: &WorkflowId, step: &str) -> Option<Arc<dyn StepBody>> {
        self.bodies.get(&(workflow_id.clone(), SmolStr::new(step))).cloned()
    }
}
