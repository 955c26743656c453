// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Per-step decorators and workflow-level lifecycle hooks (§4.2).
//!
//! Policies compose in list order: the first listed is outermost. Expressed
//! as a closed set of variants (per the Design Notes, replacing the source's
//! subclass-based policy registration) so the engine dispatches by variant
//! rather than method override; a `Custom` variant embeds behavior via a
//! trait object for cases the built-ins don't cover.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A step policy wraps a step invocation: it may invoke the call multiple
/// times, time-bound it, observe exceptions, or short-circuit.
#[derive(Clone)]
pub enum StepPolicy {
    /// Run once, and on exception retry up to `max_retries` more times,
    /// sleeping `wait` between attempts.
    Retry { max_retries: u32, wait: Duration },
    /// The wrapped call must not exceed `seconds`; on exceedance the call is
    /// treated as failed (best-effort cooperative cancellation, §4.2/§5).
    Timeout { seconds: Duration },
    /// Escape hatch for behavior the built-ins don't cover.
    Custom(Arc<dyn CustomStepPolicy>),
}

impl fmt::Debug for StepPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPolicy::Retry { max_retries, wait } => {
                f.debug_struct("Retry").field("max_retries", max_retries).field("wait", wait).finish()
            }
            StepPolicy::Timeout { seconds } => f.debug_struct("Timeout").field("seconds", seconds).finish(),
            StepPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Observer hooks for a [`StepPolicy::Custom`] variant. Invoked around each
/// attempt of the wrapped step call by the policy engine in `weft-worker`.
pub trait CustomStepPolicy: Send + Sync {
    fn before_attempt(&self, _attempt: u32) {}
    fn after_attempt(&self, _attempt: u32, _outcome: &Result<Value, String>) {}
}

/// Workflow-level lifecycle callbacks, used for tracing and for influencing
/// broker-visible state (e.g. a policy that reads a step's timeout and sets
/// the assignment deadline accordingly).
pub trait WorkflowPolicy: Send + Sync {
    fn on_workflow_start(&self, _workflow_id: &str, _instance_id: &str) {}
    fn on_step_start(&self, _instance_id: &str, _step: &str) {}
    fn on_step_success(&self, _instance_id: &str, _step: &str, _result: &Value) {}
    fn on_step_failure(&self, _instance_id: &str, _step: &str, _error: &str) {}
    fn on_workflow_end(&self, _instance_id: &str, _status: crate::status::Status) {}

    /// Deadline hint for a step's assignment lease, if this policy wants to
    /// override the broker's configured default (`StepTimeoutWorkerPolicy` in §4.2).
    fn step_timeout(&self, _step: &str) -> Option<Duration> {
        None
    }
}

/// The canonical `StepTimeoutWorkerPolicy` from §4.2: reads a step's
/// `Timeout` policy and reports it as the assignment deadline hint.
pub struct StepTimeoutWorkerPolicy {
    timeouts: std::collections::HashMap<String, Duration>,
}

impl StepTimeoutWorkerPolicy {
    pub fn new(timeouts: std::collections::HashMap<String, Duration>) -> Self {
        Self { timeouts }
    }
}

impl WorkflowPolicy for StepTimeoutWorkerPolicy {
    fn step_timeout(&self, step: &str) -> Option<Duration> {
        self.timeouts.get(step).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySpec {
    pub max_retries: u32,
    pub wait_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSpec {
    pub seconds_ms: u64,
}
