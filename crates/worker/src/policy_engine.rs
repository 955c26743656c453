// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Step-level policy pipeline (§4.2): `Retry` and `Timeout` wrap the step
//! body in list order, outermost first; `Custom` observes each attempt.

use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use weft_core::StepPolicy;

use crate::registry::StepBody;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs `body` wrapped by `policies`, applied outermost-first per §4.2.
pub fn invoke_step<'a>(
    policies: &'a [StepPolicy],
    body: Arc<dyn StepBody>,
    inputs: Arc<HashMap<String, Value>>,
    predecessor_results: Arc<HashMap<SmolStr, Value>>,
) -> BoxFuture<'a, Result<Value, String>> {
    Box::pin(async move {
        match policies.split_first() {
            None => body.call(&inputs, &predecessor_results).await,
            Some((StepPolicy::Retry { max_retries, wait }, rest)) => {
                let mut attempt = 0u32;
                loop {
                    let result = invoke_step(rest, body.clone(), inputs.clone(), predecessor_results.clone()).await;
                    match result {
                        Ok(v) => break Ok(v),
                        Err(_) if attempt < *max_retries => {
                            attempt += 1;
                            if !wait.is_zero() {
                                tokio::time::sleep(*wait).await;
                            }
                        }
                        Err(e) => break Err(e),
                    }
                }
            }
            Some((StepPolicy::Timeout { seconds }, rest)) => {
                match tokio::time::timeout(*seconds, invoke_step(rest, body.clone(), inputs.clone(), predecessor_results.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("step timed out after {seconds:?}")),
                }
            }
            Some((StepPolicy::Custom(hook), rest)) => {
                hook.before_attempt(0);
                let result = invoke_step(rest, body.clone(), inputs.clone(), predecessor_results.clone()).await;
                hook.after_attempt(0, &result);
                result
            }
        }
    })
}
