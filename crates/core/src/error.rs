// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Error kinds shared across the broker, worker, and engine crates.

use thiserror::Error;

/// Cycles, duplicate step names, missing predecessor references, conflicting
/// action edges — anything that makes a graph inadmissible at construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphConstructionError {
    #[error("workflow graph contains a cycle through step '{0}'")]
    Cycle(String),
    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),
    #[error("step '{0}' references unknown predecessor '{1}'")]
    UnknownPredecessor(String, String),
    #[error("step '{0}' has no successors declared under action '{1}'")]
    UnknownAction(String, String),
    #[error("workflow output references unknown step '{0}'")]
    UnknownOutput(String),
}

/// Dispatch-time missing/mistyped workflow inputs, or a parameter binding
/// unresolved at lease time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputValidationError {
    #[error("missing required workflow input '{0}'")]
    MissingInput(String),
    #[error("unexpected workflow input '{0}' (not declared in input_keys)")]
    UnknownInput(String),
    #[error("step '{0}' parameter '{1}' binding could not be resolved: {2}")]
    UnresolvedBinding(String, String, String),
}

/// Registering a differing definition under an existing `(workflow_id, version)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("schema conflict for workflow '{workflow_id}' version '{version}': definition differs from the registered one")]
pub struct SchemaConflictError {
    pub workflow_id: String,
    pub version: String,
}

/// Reporting a step the worker does not hold, or whose lease was reaped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeaseError {
    #[error("worker '{0}' does not hold a lease for step '{1}' of instance '{2}'")]
    NotHeld(String, String, String),
    #[error("lease for step '{0}' of instance '{1}' was already reclaimed")]
    Reclaimed(String, String),
}

/// Backend failure; surfaces intact to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

/// The step body raised; passes through the retry policy, becomes `Failed`
/// when retries exhaust.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("step execution error: {0}")]
pub struct StepExecutionError(pub String);

/// Deadline exceeded by the timeout policy or the lease reaper.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("timeout after {0:?}")]
pub struct TimeoutError(pub std::time::Duration);

/// Top-level error union returned by broker/worker/engine operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WeftError {
    #[error(transparent)]
    GraphConstruction(#[from] GraphConstructionError),
    #[error(transparent)]
    InputValidation(#[from] InputValidationError),
    #[error(transparent)]
    SchemaConflict(#[from] SchemaConflictError),
    #[error(transparent)]
    Lease(#[from] LeaseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    StepExecution(#[from] StepExecutionError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("workflow '{0}' version '{1}' is not registered")]
    UnknownWorkflow(String, String),
    #[error("workflow '{0}' is declared by a registered repository but version '{1}' has no schema registered locally; register it via a worker first")]
    RepositoryDeclaredNoSchema(String, String),
    #[error("instance '{0}' not found")]
    UnknownInstance(String),
    #[error("worker '{0}' not found")]
    UnknownWorker(String),
}
