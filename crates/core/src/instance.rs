// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! A running (or completed) dispatch of a [`Workflow`], and the pure
//! readiness-propagation functions that drive it (§4.1).
//!
//! These functions take no I/O: the broker and the in-process engines
//! (`weft-engine`) each hold their own [`Instance`] storage and call the same
//! functions here to decide what becomes ready, skipped, or cancelled after
//! a step reports a terminal outcome. That sharing is what keeps broker-
//! mediated and in-process execution semantically identical.

use crate::graph::{Action, Binding, Context, JoinMode, Workflow};
use crate::ids::{InstanceId, WorkflowKey};
use crate::status::Status;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::{HashMap, VecDeque};

/// Runtime state of one workflow dispatch.
#[derive(Debug, Clone)]
pub struct Instance {
    pub instance_id: InstanceId,
    pub workflow_key: WorkflowKey,
    pub inputs: HashMap<String, Value>,
    pub step_states: HashMap<SmolStr, Status>,
    pub step_results: HashMap<SmolStr, Value>,
    pub step_errors: HashMap<SmolStr, String>,
    /// The action each succeeded step resolved to; drives branch-exclusive
    /// cancellation of the paths not taken.
    pub selected_actions: HashMap<SmolStr, Action>,
    /// Steps ready to run but not yet dispatched to a worker.
    pub queue: VecDeque<SmolStr>,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
}

impl Instance {
    pub fn new(instance_id: InstanceId, workflow_key: WorkflowKey, inputs: HashMap<String, Value>, started_at_ms: u64) -> Self {
        Self {
            instance_id,
            workflow_key,
            inputs,
            step_states: HashMap::new(),
            step_results: HashMap::new(),
            step_errors: HashMap::new(),
            selected_actions: HashMap::new(),
            queue: VecDeque::new(),
            started_at_ms,
            finished_at_ms: None,
        }
    }

    pub fn state_of(&self, step: &str) -> Status {
        self.step_states.get(step).copied().unwrap_or(Status::Pending)
    }

    /// `true` once every step in `workflow` has reached a terminal state.
    pub fn is_complete(&self, workflow: &Workflow) -> bool {
        workflow.steps.keys().all(|name| self.state_of(name).is_terminal())
    }

    pub fn aggregate_status(&self, workflow: &Workflow) -> Status {
        Status::aggregate(workflow.steps.keys().map(|name| {
            self.step_states.get(name).unwrap_or(&Status::Pending)
        }))
    }

    fn context(&self) -> Context<'_> {
        Context::new(&self.inputs, &self.step_results)
    }
}

/// What happened to a step as a side effect of readiness propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessEvent {
    Enqueued(SmolStr),
    Skipped(SmolStr),
    Cancelled(SmolStr),
}

/// Seeds the queue with every root step, gating on conditions (§4.1, §8
/// scenario 10). Call once, right after constructing an [`Instance`].
pub fn dispatch_instance(workflow: &Workflow, instance: &mut Instance) -> Vec<ReadinessEvent> {
    let mut events = Vec::new();
    let roots: Vec<SmolStr> = workflow.roots().into_iter().cloned().collect();
    for name in roots {
        make_ready_or_skip(workflow, instance, &name, &mut events);
    }
    events
}

/// Records a step's successful completion, resolves its chosen action,
/// cancels the branches it did not select, and recomputes readiness for its
/// successors.
pub fn on_step_succeeded(
    workflow: &Workflow,
    instance: &mut Instance,
    step: &str,
    result: Value,
) -> Vec<ReadinessEvent> {
    let mut events = Vec::new();
    instance.step_states.insert(SmolStr::new(step), Status::Succeeded);
    let action = resolve_action(workflow, step, &result);
    instance.selected_actions.insert(SmolStr::new(step), action.clone());
    instance.step_results.insert(SmolStr::new(step), result);

    if let Some(def) = workflow.step(step) {
        for (edge_action, targets) in &def.successors {
            if *edge_action != action {
                for t in targets {
                    cancel_cascade(workflow, instance, t, &mut events);
                }
            }
        }
        if let Some(targets) = def.successors.get(&action) {
            for t in targets.clone() {
                make_ready_or_skip(workflow, instance, &t, &mut events);
            }
        }
    }
    events
}

/// Records a step's failure and propagates AND-join cancellation downstream
/// (§4.1: "any predecessor FAILED cancels an AND-joined successor").
pub fn on_step_failed(workflow: &Workflow, instance: &mut Instance, step: &str, error: String) -> Vec<ReadinessEvent> {
    let mut events = Vec::new();
    instance.step_states.insert(SmolStr::new(step), Status::Failed);
    instance.step_errors.insert(SmolStr::new(step), error);
    if let Some(successors) = workflow.steps.get(step).map(|s| &s.successors) {
        for targets in successors.values() {
            for t in targets.clone() {
                recompute_readiness(workflow, instance, &t, &mut events);
            }
        }
    }
    events
}

fn resolve_action(workflow: &Workflow, step: &str, result: &Value) -> Action {
    let def = match workflow.step(step) {
        Some(d) => d,
        None => return Action::default_action(),
    };
    if let Value::String(s) = result {
        let candidate = Action::from(s.as_str());
        if def.successors.contains_key(&candidate) {
            return candidate;
        }
    }
    Action::default_action()
}

fn cancel_cascade(workflow: &Workflow, instance: &mut Instance, step: &str, events: &mut Vec<ReadinessEvent>) {
    let key = SmolStr::new(step);
    let current = instance.state_of(step);
    if current.is_terminal() {
        return;
    }
    instance.step_states.insert(key.clone(), Status::Cancelled);
    events.push(ReadinessEvent::Cancelled(key));
    for t in workflow.all_successors_of(step).cloned().collect::<Vec<_>>() {
        cancel_cascade(workflow, instance, &t, events);
    }
}

/// Re-evaluates whether `step` is ready, should be cancelled, or remains
/// pending, given its predecessors' current states. Idempotent: does
/// nothing if `step` is already `Running` or terminal.
fn recompute_readiness(workflow: &Workflow, instance: &mut Instance, step: &str, events: &mut Vec<ReadinessEvent>) {
    if instance.state_of(step).is_terminal() || instance.state_of(step) == Status::Running {
        return;
    }
    let def = match workflow.step(step) {
        Some(d) => d,
        None => return,
    };
    if def.predecessors.is_empty() {
        make_ready_or_skip(workflow, instance, step, events);
        return;
    }

    let states: Vec<Status> = def.predecessors.iter().map(|p| instance.state_of(p)).collect();
    let all_terminal = states.iter().all(|s| s.is_terminal());
    let any_successful = states.iter().any(|s| s.is_successful_terminal());
    let any_failed_or_cancelled = states.iter().any(|s| matches!(s, Status::Failed | Status::Cancelled));

    match def.join_mode {
        JoinMode::And => {
            if any_failed_or_cancelled {
                cancel_cascade(workflow, instance, step, events);
            } else if all_terminal && any_successful {
                make_ready_or_skip(workflow, instance, step, events);
            }
        }
        JoinMode::Or => {
            if any_successful {
                make_ready_or_skip(workflow, instance, step, events);
            } else if all_terminal {
                cancel_cascade(workflow, instance, step, events);
            }
        }
    }
}

/// A step becomes ready; gate on its conditions (own + any
/// `ConditionalStepOutput` binding) and either enqueue or mark `Skipped`,
/// propagating onward in the skip case as if the step had succeeded.
fn make_ready_or_skip(workflow: &Workflow, instance: &mut Instance, step: &str, events: &mut Vec<ReadinessEvent>) {
    if instance.state_of(step).is_terminal() {
        return;
    }
    let def = match workflow.step(step) {
        Some(d) => d,
        None => return,
    };

    let ctx = instance.context();
    let gated = !def.conditions.iter().all(|c| c(&ctx))
        || def
            .dependency_bindings
            .values()
            .filter(|b| matches!(b, Binding::ConditionalStepOutput(_, _)))
            .any(|b| !b.is_satisfied(&ctx));

    let name = SmolStr::new(step);
    if gated {
        instance.step_states.insert(name.clone(), Status::Skipped);
        events.push(ReadinessEvent::Skipped(name));
        // Treat as a successful terminal for downstream propagation.
        for t in workflow.all_successors_of(step).cloned().collect::<Vec<_>>() {
            recompute_readiness(workflow, instance, &t, events);
        }
    } else {
        instance.queue.push_back(name.clone());
        events.push(ReadinessEvent::Enqueued(name));
    }
}

/// All steps whose predecessors are satisfied but that have not yet been
/// dequeued for execution, removed from the queue (FIFO).
pub fn pop_ready(instance: &mut Instance) -> Option<SmolStr> {
    instance.queue.pop_front()
}

pub fn mark_running(instance: &mut Instance, step: &str) {
    instance.step_states.insert(SmolStr::new(step), Status::Running);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Workflow;
    use crate::ids::WorkflowKey;

    fn inst(workflow_key: WorkflowKey) -> Instance {
        Instance::new(InstanceId::new(), workflow_key, HashMap::new(), 0)
    }

    #[test]
    fn linear_chain_propagates_to_completion() {
        let wf = Workflow::builder("w", "v1").then("a", Action::default_action(), "b").build().unwrap();
        let mut instance = inst(WorkflowKey::new("w", "v1"));
        let events = dispatch_instance(&wf, &mut instance);
        assert_eq!(events, vec![ReadinessEvent::Enqueued(SmolStr::new("a"))]);
        let events = on_step_succeeded(&wf, &mut instance, "a", Value::Null);
        assert_eq!(events, vec![ReadinessEvent::Enqueued(SmolStr::new("b"))]);
        assert_eq!(instance.state_of("a"), Status::Succeeded);
    }

    #[test]
    fn and_join_cancels_on_any_failure() {
        let mut b = Workflow::builder("w", "v1");
        b = b.then("a", Action::default_action(), "c");
        b = b.then("b", Action::default_action(), "c");
        let wf = b.build().unwrap();
        let mut instance = inst(WorkflowKey::new("w", "v1"));
        dispatch_instance(&wf, &mut instance);
        on_step_succeeded(&wf, &mut instance, "a", Value::Null);
        let events = on_step_failed(&wf, &mut instance, "b", "boom".to_string());
        assert!(events.contains(&ReadinessEvent::Cancelled(SmolStr::new("c"))));
        assert_eq!(instance.state_of("c"), Status::Cancelled);
    }

    #[test]
    fn or_join_ready_on_first_success() {
        let mut b = Workflow::builder("w", "v1");
        b = b.then("a", Action::default_action(), "c");
        b = b.then("b", Action::default_action(), "c");
        b.step("c").join_mode(JoinMode::Or);
        let wf = b.build().unwrap();
        let mut instance = inst(WorkflowKey::new("w", "v1"));
        dispatch_instance(&wf, &mut instance);
        let events = on_step_succeeded(&wf, &mut instance, "a", Value::Null);
        assert!(events.contains(&ReadinessEvent::Enqueued(SmolStr::new("c"))));
    }

    #[test]
    fn branch_selection_cancels_unselected_action() {
        let mut b = Workflow::builder("w", "v1");
        b = b.then("a", Action::from("yes"), "b");
        b = b.then("a", Action::from("no"), "c");
        let wf = b.build().unwrap();
        let mut instance = inst(WorkflowKey::new("w", "v1"));
        dispatch_instance(&wf, &mut instance);
        let events = on_step_succeeded(&wf, &mut instance, "a", Value::String("yes".to_string()));
        assert!(events.contains(&ReadinessEvent::Cancelled(SmolStr::new("c"))));
        assert!(events.contains(&ReadinessEvent::Enqueued(SmolStr::new("b"))));
    }

    #[test]
    fn condition_gate_skips_step() {
        let mut b = Workflow::builder("w", "v1");
        b.step("a").condition(std::sync::Arc::new(|ctx: &Context<'_>| {
            ctx.get("flag").and_then(|v| v.as_bool()).unwrap_or(false)
        }));
        let wf = b.build().unwrap();
        let mut inputs = HashMap::new();
        inputs.insert("flag".to_string(), Value::Bool(false));
        let mut instance = Instance::new(InstanceId::new(), WorkflowKey::new("w", "v1"), inputs, 0);
        let events = dispatch_instance(&wf, &mut instance);
        assert_eq!(events, vec![ReadinessEvent::Skipped(SmolStr::new("a"))]);
    }
}
