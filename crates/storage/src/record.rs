// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! The durable shape of one workflow instance, independent of backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::{HashMap, VecDeque};
use weft_core::{Status, WorkflowKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub workflow_key: WorkflowKey,
    pub step_states: HashMap<SmolStr, Status>,
    pub step_results: HashMap<SmolStr, Value>,
    pub inputs: HashMap<String, Value>,
    pub queue: VecDeque<SmolStr>,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
    pub final_status: Option<Status>,
}

impl RunRecord {
    pub fn new(workflow_key: WorkflowKey, steps: &[SmolStr], inputs: HashMap<String, Value>, started_at_ms: u64) -> Self {
        Self {
            workflow_key,
            step_states: steps.iter().map(|s| (s.clone(), Status::Pending)).collect(),
            step_results: HashMap::new(),
            inputs,
            queue: VecDeque::new(),
            started_at_ms,
            finished_at_ms: None,
            final_status: None,
        }
    }
}
