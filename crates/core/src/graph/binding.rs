// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Dependency-injection bindings (§4.1, §9).
//!
//! Modeled as an explicit mapping from parameter name to a binding variant,
//! built at construction time, per the Design Notes' guidance for the
//! source's dynamic-decorator dependency declarations: inspection APIs
//! resolve bindings without runtime introspection.

use crate::error::InputValidationError;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;

/// Context a [`Condition`] is evaluated against: the workflow's declared
/// inputs plus whatever predecessor results are already stored.
pub struct Context<'a> {
    pub inputs: &'a HashMap<String, Value>,
    pub results: &'a HashMap<SmolStr, Value>,
}

impl<'a> Context<'a> {
    pub fn new(inputs: &'a HashMap<String, Value>, results: &'a HashMap<SmolStr, Value>) -> Self {
        Self { inputs, results }
    }

    /// Looks up a predecessor result first, then a workflow input.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.results.get(key).or_else(|| self.inputs.get(key))
    }
}

/// A condition callable, evaluated at dispatch time against a [`Context`].
pub type Condition = Arc<dyn Fn(&Context<'_>) -> bool + Send + Sync>;

/// Where a step parameter's value comes from.
#[derive(Clone)]
pub enum Binding {
    /// Bound to a declared workflow input key.
    WorkflowInput(String),
    /// Bound to another step's stored result.
    StepOutput(SmolStr),
    /// Bound to another step's result, gated by a condition evaluated at
    /// dispatch time; if the condition is false the edge's target is
    /// `SKIPPED` (§4.1).
    ConditionalStepOutput(SmolStr, Condition),
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::WorkflowInput(key) => f.debug_tuple("WorkflowInput").field(key).finish(),
            Binding::StepOutput(step) => f.debug_tuple("StepOutput").field(step).finish(),
            Binding::ConditionalStepOutput(step, _) => {
                f.debug_tuple("ConditionalStepOutput").field(step).field(&"<condition>").finish()
            }
        }
    }
}

impl Binding {
    /// The step name this binding depends on, if any.
    pub fn source_step(&self) -> Option<&SmolStr> {
        match self {
            Binding::WorkflowInput(_) => None,
            Binding::StepOutput(step) | Binding::ConditionalStepOutput(step, _) => Some(step),
        }
    }

    pub fn is_satisfied(&self, ctx: &Context<'_>) -> bool {
        match self {
            Binding::WorkflowInput(_) | Binding::StepOutput(_) => true,
            Binding::ConditionalStepOutput(_, cond) => cond(ctx),
        }
    }

    /// Resolves this binding to its bound value, per variant — a workflow
    /// input looks only at `ctx.inputs`, a step output only at `ctx.results`.
    /// `None` means the binding has nothing to resolve against yet (e.g. a
    /// predecessor that finished `SKIPPED` rather than `SUCCEEDED`, which
    /// never deposits a stored result).
    pub fn resolve<'a>(&self, ctx: &Context<'a>) -> Option<&'a Value> {
        match self {
            Binding::WorkflowInput(key) => ctx.inputs.get(key),
            Binding::StepOutput(step) | Binding::ConditionalStepOutput(step, _) => ctx.results.get(step.as_str()),
        }
    }
}

/// Resolves every declared binding for a step into its assembled payload
/// (§4.1 dependency injection). A binding that cannot be resolved against
/// `ctx` is a lease-time error that fails the step immediately (§4.4).
pub fn resolve_bindings(
    step_name: &str,
    bindings: &HashMap<String, Binding>,
    ctx: &Context<'_>,
) -> Result<HashMap<String, Value>, InputValidationError> {
    let mut assembled = HashMap::with_capacity(bindings.len());
    for (param, binding) in bindings {
        let value = binding.resolve(ctx).ok_or_else(|| {
            InputValidationError::UnresolvedBinding(
                step_name.to_string(),
                param.clone(),
                format!("{binding:?} has no stored value"),
            )
        })?;
        assembled.insert(param.clone(), value.clone());
    }
    Ok(assembled)
}
