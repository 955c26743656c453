// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Step (graph node) definition.

use super::binding::{Binding, Condition};
use crate::policy::StepPolicy;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Named outgoing edge set from a step; chosen by the step's return value
/// (§4.1). Defaults to `"default"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(pub SmolStr);

impl Action {
    pub const DEFAULT: &'static str = "default";

    pub fn default_action() -> Self {
        Action(SmolStr::new(Self::DEFAULT))
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::default_action()
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Action(SmolStr::new(s))
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `join_mode` in §3: how a step's predecessors combine to determine readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinMode {
    /// Ready only when all predecessors are terminal and at least one
    /// selected the edge to this step.
    #[default]
    And,
    /// Ready when any predecessor is terminal and selected the edge.
    Or,
}

/// A workflow graph node.
#[derive(Clone)]
pub struct Step {
    pub name: SmolStr,
    pub predecessors: BTreeSet<SmolStr>,
    pub successors: HashMap<Action, Vec<SmolStr>>,
    pub join_mode: JoinMode,
    pub dependency_bindings: HashMap<String, Binding>,
    pub conditions: Vec<Condition>,
    pub policies: Vec<StepPolicy>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("predecessors", &self.predecessors)
            .field("successors", &self.successors)
            .field("join_mode", &self.join_mode)
            .field("dependency_bindings", &self.dependency_bindings)
            .field("conditions", &self.conditions.len())
            .field("policies", &self.policies)
            .finish()
    }
}

impl Step {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            predecessors: BTreeSet::new(),
            successors: HashMap::new(),
            join_mode: JoinMode::default(),
            dependency_bindings: HashMap::new(),
            conditions: Vec::new(),
            policies: Vec::new(),
        }
    }

    /// Ergonomic edge builder: `step.then(target)` / `step.then_action(target, "skip")`.
    /// Per the Design Notes this replaces an operator-overloaded `a >> b` builder.
    pub fn then(&mut self, target: impl Into<SmolStr>) -> &mut Self {
        self.then_action(Action::default_action(), target)
    }

    pub fn then_action(&mut self, action: impl Into<Action>, target: impl Into<SmolStr>) -> &mut Self {
        let targets = self.successors.entry(action.into()).or_default();
        let target = target.into();
        if !targets.contains(&target) {
            targets.push(target);
        }
        self
    }

    pub fn join_mode(&mut self, mode: JoinMode) -> &mut Self {
        self.join_mode = mode;
        self
    }

    pub fn retry(&mut self, max_retries: u32, wait: Duration) -> &mut Self {
        self.policies.push(StepPolicy::Retry { max_retries, wait });
        self
    }

    pub fn timeout(&mut self, seconds: Duration) -> &mut Self {
        self.policies.push(StepPolicy::Timeout { seconds });
        self
    }

    pub fn policy(&mut self, policy: StepPolicy) -> &mut Self {
        self.policies.push(policy);
        self
    }

    pub fn condition(&mut self, cond: Condition) -> &mut Self {
        self.conditions.push(cond);
        self
    }

    /// Declarative dependency: `param` is bound to `upstream`'s result, and
    /// `upstream` becomes a predecessor edge under `action`.
    pub fn depends_on(
        &mut self,
        param: impl Into<String>,
        upstream: impl Into<SmolStr>,
    ) -> &mut Self {
        let upstream = upstream.into();
        self.predecessors.insert(upstream.clone());
        self.dependency_bindings.insert(param.into(), Binding::StepOutput(upstream));
        self
    }

    pub fn conditional_depends_on(
        &mut self,
        param: impl Into<String>,
        upstream: impl Into<SmolStr>,
        cond: Condition,
    ) -> &mut Self {
        let upstream = upstream.into();
        self.predecessors.insert(upstream.clone());
        self.dependency_bindings
            .insert(param.into(), Binding::ConditionalStepOutput(upstream, cond));
        self
    }

    pub fn depends_on_input(&mut self, param: impl Into<String>, input_key: impl Into<String>) -> &mut Self {
        self.dependency_bindings.insert(param.into(), Binding::WorkflowInput(input_key.into()));
        self
    }

    /// Convenience max_retries/wait reducible to a retry policy (§3).
    pub fn max_retries(&self) -> u32 {
        self.policies
            .iter()
            .find_map(|p| if let StepPolicy::Retry { max_retries, .. } = p { Some(*max_retries) } else { None })
            .unwrap_or(0)
    }
}
