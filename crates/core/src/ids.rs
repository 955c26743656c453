// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Identifier types for workflows, instances, and workers.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Globally unique identifier for one workflow dispatch.
    pub struct InstanceId("inst-");
}

crate::define_id! {
    /// Broker-generated identifier for a registered worker process.
    pub struct WorkerId("wkr-");
}

/// A workflow's identity is the pair `(workflow_id, version)`; `workflow_id`
/// is caller-chosen (it names a schema, not a runtime record), unlike
/// [`InstanceId`]/[`WorkerId`] which the broker mints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// `(workflow_id, version)` together are the schema identity (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowKey {
    pub workflow_id: WorkflowId,
    pub version: String,
}

impl WorkflowKey {
    pub fn new(workflow_id: impl Into<WorkflowId>, version: impl Into<String>) -> Self {
        Self { workflow_id: workflow_id.into(), version: version.into() }
    }
}

impl fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.workflow_id, self.version)
    }
}
