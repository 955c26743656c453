// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Serializable workflow schema (§6): the wire/on-disk form the broker
//! accepts at `/repository/register` and round-trips through YAML and JSON.
//!
//! Step bodies and conditions are Rust closures and cannot serialize; the
//! schema captures the graph shape (edges, join mode, declared bindings,
//! retry/timeout policy) and represents a condition only as a named flag.
//! Reattaching the actual callables is the caller's job when a schema is
//! loaded back into a [`super::workflow::WorkflowBuilder`] (see
//! `WorkflowSchema::into_builder`).

use super::binding::Binding;
use super::step::{Action, JoinMode};
use super::workflow::Workflow;
use crate::error::GraphConstructionError;
use crate::ids::WorkflowId;
use crate::policy::{RetrySpec, StepPolicy, TimeoutSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSchema {
    WorkflowInput { key: String },
    StepOutput { step: String },
    /// `condition_name` is an opaque label the host application resolves to
    /// an actual [`super::binding::Condition`] at load time; the predicate
    /// logic itself is never serialized.
    ConditionalStepOutput { step: String, condition_name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepSchema {
    pub successors: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub join_mode: Option<JoinMode>,
    #[serde(default)]
    pub dependency_bindings: HashMap<String, BindingSchema>,
    /// Named conditions this step is gated by; names are resolved against
    /// the host application's condition registry, not encoded here.
    #[serde(default)]
    pub condition_names: Vec<String>,
    #[serde(default)]
    pub retry: Option<RetrySpec>,
    #[serde(default)]
    pub timeout: Option<TimeoutSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSchema {
    pub workflow_id: String,
    pub version: String,
    pub steps: HashMap<String, StepSchema>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub input_keys: Vec<String>,
}

impl WorkflowSchema {
    pub fn workflow_id(&self) -> WorkflowId {
        WorkflowId::new(self.workflow_id.clone())
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Reconstructs a [`Workflow`] from its wire form. Conditions cannot
    /// cross the wire (they are Rust closures); a step with declared
    /// `condition_names` is rebuilt with no gating condition attached — the
    /// HTTP registration path (§6) cannot express conditional workflows, only
    /// the in-process `Broker::register_workflow` Rust API can.
    pub fn into_workflow(self) -> Result<Workflow, GraphConstructionError> {
        let mut builder = Workflow::builder(self.workflow_id.clone(), self.version.clone());
        for (name, step_schema) in &self.steps {
            let step = builder.step(name);
            step.join_mode(step_schema.join_mode.unwrap_or_default());
            if let Some(retry) = step_schema.retry {
                step.retry(retry.max_retries, Duration::from_millis(retry.wait_ms));
            }
            if let Some(timeout) = step_schema.timeout {
                step.timeout(Duration::from_millis(timeout.seconds_ms));
            }
            for (param, binding) in &step_schema.dependency_bindings {
                match binding {
                    BindingSchema::WorkflowInput { key } => {
                        step.depends_on_input(param.clone(), key.clone());
                    }
                    BindingSchema::StepOutput { step: upstream } | BindingSchema::ConditionalStepOutput { step: upstream, .. } => {
                        step.depends_on(param.clone(), upstream.clone());
                    }
                }
            }
        }
        for (name, step_schema) in &self.steps {
            for (action, targets) in &step_schema.successors {
                for target in targets {
                    builder = builder.then(name, Action::from(action.as_str()), target);
                }
            }
        }
        builder = builder.outputs(self.outputs.clone());
        builder = builder.input_keys(self.input_keys.clone());
        builder.build()
    }
}

impl Workflow {
    /// Projects this workflow onto its wire form. Conditions become an
    /// anonymous count (the predicate itself never serializes); schema
    /// conflict detection (§4.4) compares this projection, so two workflows
    /// differing only in which closure a condition runs are not
    /// distinguished from one another — a deliberate, documented limit.
    pub fn to_schema(&self) -> WorkflowSchema {
        let steps = self
            .steps
            .iter()
            .map(|(name, step)| {
                let successors = step
                    .successors
                    .iter()
                    .map(|(action, targets)| (action.0.to_string(), targets.iter().map(|t| t.to_string()).collect()))
                    .collect();
                let dependency_bindings = step
                    .dependency_bindings
                    .iter()
                    .map(|(param, binding)| {
                        let schema = match binding {
                            Binding::WorkflowInput(key) => BindingSchema::WorkflowInput { key: key.clone() },
                            Binding::StepOutput(upstream) => BindingSchema::StepOutput { step: upstream.to_string() },
                            Binding::ConditionalStepOutput(upstream, _) => BindingSchema::ConditionalStepOutput {
                                step: upstream.to_string(),
                                condition_name: "anonymous".to_string(),
                            },
                        };
                        (param.clone(), schema)
                    })
                    .collect();
                let retry = step.policies.iter().find_map(|p| match p {
                    StepPolicy::Retry { max_retries, wait } => {
                        Some(RetrySpec { max_retries: *max_retries, wait_ms: wait.as_millis() as u64 })
                    }
                    _ => None,
                });
                let timeout = step.policies.iter().find_map(|p| match p {
                    StepPolicy::Timeout { seconds } => Some(TimeoutSpec { seconds_ms: seconds.as_millis() as u64 }),
                    _ => None,
                });
                let step_schema = StepSchema {
                    successors,
                    join_mode: Some(step.join_mode),
                    dependency_bindings,
                    condition_names: step.conditions.iter().map(|_| "anonymous".to_string()).collect(),
                    retry,
                    timeout,
                };
                (name.to_string(), step_schema)
            })
            .collect();
        WorkflowSchema {
            workflow_id: self.workflow_id.to_string(),
            version: self.version.clone(),
            steps,
            outputs: self.outputs.iter().map(|o| o.to_string()).collect(),
            input_keys: self.input_keys.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowSchema {
        let mut steps = HashMap::new();
        let mut successors = HashMap::new();
        successors.insert("default".to_string(), vec!["b".to_string()]);
        steps.insert("a".to_string(), StepSchema { successors, ..Default::default() });
        steps.insert("b".to_string(), StepSchema::default());
        WorkflowSchema {
            workflow_id: "wf".to_string(),
            version: "v1".to_string(),
            steps,
            outputs: vec!["b".to_string()],
            input_keys: vec!["x".to_string()],
        }
    }

    #[test]
    fn yaml_round_trips() {
        let schema = sample();
        let yaml = schema.to_yaml().unwrap();
        let back = WorkflowSchema::from_yaml(&yaml).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn json_round_trips() {
        let schema = sample();
        let json = schema.to_json().unwrap();
        let back = WorkflowSchema::from_json(&json).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn workflow_schema_round_trip_preserves_shape() {
        let wf = Workflow::builder("wf", "v1")
            .then("a", Action::default_action(), "b")
            .outputs(["b"])
            .input_keys(["x"])
            .build()
            .unwrap();
        let schema = wf.to_schema();
        let rebuilt = schema.clone().into_workflow().unwrap();
        assert_eq!(rebuilt.to_schema(), schema);
    }
}
