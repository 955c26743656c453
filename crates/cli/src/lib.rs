// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Shared pieces of the `weft` CLI: the admin HTTP client and the
//! worker-process runner, usable standalone by embedding binaries.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod admin_client;
pub mod worker_process;

pub use admin_client::AdminClient;
pub use worker_process::run_worker_processes;
