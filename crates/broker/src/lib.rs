// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Broker scheduler (§4.4): the authoritative view of every workflow
//! instance, plus an `axum` HTTP veneer over the §6 surface.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod http;
pub mod repository;
pub mod scheduler;

pub use repository::{RepositoryEntry, RepositoryRegistry};
pub use scheduler::{Broker, StepGet, WorkerSummary};
