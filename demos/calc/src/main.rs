// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Typed dependency-injection demo: a three-step workflow — `add` depends on
//! two workflow inputs, `multiply` depends on `add`'s result plus another
//! input, `square` depends only on `multiply`'s result, every binding
//! declared with `Step::depends_on`/`depends_on_input` rather than read
//! by hand from the raw predecessor map — driven end to end by the
//! [`SerialEngine`] with no broker involved.

use async_trait::async_trait;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use weft_core::Workflow;
use weft_engine::{GraphDriver, SerialEngine, StepBody, StepRegistry};
use weft_storage::{InMemoryStore, RuntimeStorage};

struct Add;

#[async_trait]
impl StepBody for Add {
    async fn call(&self, inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
        let a = inputs.get("a").and_then(Value::as_f64).ok_or("missing numeric input 'a'")?;
        let b = inputs.get("b").and_then(Value::as_f64).ok_or("missing numeric input 'b'")?;
        Ok(Value::from(a + b))
    }
}

struct Multiply;

#[async_trait]
impl StepBody for Multiply {
    async fn call(&self, inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
        let sum = inputs.get("sum").and_then(Value::as_f64).ok_or("missing resolved binding 'sum'")?;
        let factor = inputs.get("factor").and_then(Value::as_f64).ok_or("missing resolved binding 'factor'")?;
        Ok(Value::from(sum * factor))
    }
}

struct Square;

#[async_trait]
impl StepBody for Square {
    async fn call(&self, inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
        let product = inputs.get("product").and_then(Value::as_f64).ok_or("missing resolved binding 'product'")?;
        Ok(Value::from(product * product))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let mut builder = Workflow::builder("calc", "v1").input_keys(["a", "b", "factor"]).outputs(["square"]);
    builder.step("add").depends_on_input("a", "a").depends_on_input("b", "b");
    builder.step("multiply").depends_on("sum", "add").depends_on_input("factor", "factor");
    builder.step("square").depends_on("product", "multiply");
    let workflow = builder.build()?;

    let mut registry = StepRegistry::new();
    registry.register("add", Add);
    registry.register("multiply", Multiply);
    registry.register("square", Square);

    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage.clone(), workflow, registry));

    let inputs = HashMap::from([
        ("a".to_string(), Value::from(2)),
        ("b".to_string(), Value::from(3)),
        ("factor".to_string(), Value::from(4)),
    ]);
    let instance_id = driver.dispatch(inputs).await?;

    let status = SerialEngine::new(driver).run(&instance_id).await?;
    let result = storage.get_result(&instance_id, "square").await?;

    println!("status: {status}");
    println!("(2 + 3) * 4, squared = {}", result.unwrap_or(Value::Null));
    Ok(())
}
