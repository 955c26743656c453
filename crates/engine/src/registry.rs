// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Step bodies for the in-process engines — the same shape as the worker's,
//! keyed only by step name since a [`crate::driver::GraphDriver`] already
//! scopes one [`weft_core::Workflow`].

use async_trait::async_trait;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;

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

#[derive(Default, Clone)]
pub struct StepRegistry {
    bodies: HashMap<SmolStr, Arc<dyn StepBody>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step: impl Into<SmolStr>, body: impl StepBody + 'static) -> &mut Self {
        self.bodies.insert(step.into(), Arc::new(body));
        self
    }

    pub fn lookup(&self, step: &str) -> Option<Arc<dyn StepBody>> {
        self.bodies.get(step).cloned()
    }
}
