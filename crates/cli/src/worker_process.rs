// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Library-level worker-process runner (§6 CLI surface): embedding binaries
//! build a [`WorkerEngine`] and hand it here, which fans it out across
//! `WORKER_PROCESSES` tasks and shuts them down together on Ctrl-C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use weft_worker::BrokerClient;

/// Runs `worker_processes` copies of the engine built by `make_engine` until
/// Ctrl-C, or until one process fails to register. Returns the process exit
/// code: `0` on a normal shutdown, non-zero if any process never registered.
pub async fn run_worker_processes<C, F>(make_engine: F, worker_processes: usize) -> i32
where
    C: BrokerClient + 'static,
    F: Fn() -> weft_worker::WorkerEngine<C>,
{
    let worker_processes = worker_processes.max(1);
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut set = tokio::task::JoinSet::new();
    for idx in 0..worker_processes {
        let engine = make_engine();
        let shutdown = shutdown.clone();
        set.spawn(async move {
            let result = engine.run(shutdown).await;
            (idx, result)
        });
    }

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            ctrl_c_shutdown.store(true, Ordering::Relaxed);
        }
    });

    let mut registration_failed = false;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Ok(worker_id))) => info!(process = idx, worker_id = %worker_id, "worker process exited"),
            Ok((idx, Err(e))) => {
                error!(process = idx, error = %e, "worker process failed");
                registration_failed = true;
            }
            Err(e) => {
                error!(error = %e, "worker process panicked");
                registration_failed = true;
            }
        }
    }

    if registration_failed {
        1
    } else {
        0
    }
}
