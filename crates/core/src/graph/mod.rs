// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Workflow graph types: steps, bindings, and the serializable schema.

pub mod binding;
pub mod schema;
pub mod step;
pub mod workflow;

pub use binding::{resolve_bindings, Binding, Condition, Context};
pub use schema::{BindingSchema, StepSchema, WorkflowSchema};
pub use step::{Action, JoinMode, Step};
pub use workflow::{Workflow, WorkflowBuilder};
