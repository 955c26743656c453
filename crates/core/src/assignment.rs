// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Broker-issued work handed to a worker (§3, §4.4).

use crate::ids::{InstanceId, WorkerId, WorkflowKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;

/// One leased unit of work: a single step of a single instance, with enough
/// context for the worker to resolve its parameter bindings without calling
/// back to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub instance_id: InstanceId,
    pub workflow_key: WorkflowKey,
    pub step: SmolStr,
    pub attempt: u32,
    pub inputs: HashMap<String, Value>,
    pub predecessor_results: HashMap<SmolStr, Value>,
    pub lease_deadline_ms: u64,
}

/// A worker process's self-registration with the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub worker_id: WorkerId,
    pub capabilities: Vec<String>,
    pub registered_at_ms: u64,
}

/// Outcome a worker reports back for a leased step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepReport {
    Succeeded { result: Value },
    Failed { error: String },
}
