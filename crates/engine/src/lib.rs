// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! In-process execution engines (§4.6): drive a [`weft_core::Workflow`]
//! directly against a [`weft_storage::RuntimeStorage`] backend, no broker.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod driver;
pub mod engines;
pub mod policy_engine;
pub mod registry;

pub use driver::GraphDriver;
pub use engines::{AsyncEngine, PoolEngine, SerialEngine};
pub use registry::{StepBody, StepRegistry};
