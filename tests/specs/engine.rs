//! In-process engine scenarios (§8, items 1-7 and 10), driven directly
//! against [`weft_engine::GraphDriver`] with no broker involved.

use async_trait::async_trait;
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weft_core::{Action, Context, Status, Workflow};
use weft_engine::{AsyncEngine, GraphDriver, PoolEngine, SerialEngine, StepBody, StepRegistry};
use weft_storage::{InMemoryStore, RuntimeStorage};

struct Echo;

#[async_trait]
impl StepBody for Echo {
    async fn call(&self, inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
        Ok(inputs.get("x").cloned().unwrap_or(Value::Null))
    }
}

struct AlwaysFails;

#[async_trait]
impl StepBody for AlwaysFails {
    async fn call(&self, _inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
        Err("boom".to_string())
    }
}

/// Returns `"skip"` unconditionally, to drive the branch-choice scenario.
struct Chooser;

#[async_trait]
impl StepBody for Chooser {
    async fn call(&self, _inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
        Ok(Value::String("skip".to_string()))
    }
}

/// Fails its first two calls, then succeeds; counts total invocations.
struct FlakyTwice(Arc<AtomicU32>);

#[async_trait]
impl StepBody for FlakyTwice {
    async fn call(&self, _inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
        let attempt = self.0.fetch_add(1, Ordering::SeqCst);
        if attempt < 2 {
            Err(format!("attempt {attempt} fails"))
        } else {
            Ok(Value::from(attempt))
        }
    }
}

struct SleepAndEcho(Duration);

#[async_trait]
impl StepBody for SleepAndEcho {
    async fn call(&self, _inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
        tokio::time::sleep(self.0).await;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn scenario_1_single_step_succeeds() {
    let mut builder = Workflow::builder("w1", "v1");
    builder.step("s");
    let workflow = builder.outputs(["s"]).build().unwrap();

    let mut registry = StepRegistry::new();
    registry.register("s", Echo);
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage.clone(), workflow, registry));

    let instance_id = driver.dispatch(HashMap::new()).await.unwrap();
    let status = SerialEngine::new(driver).run(&instance_id).await.unwrap();

    assert_eq!(status, Status::Succeeded);
    assert_eq!(storage.get_state(&instance_id, "s").await.unwrap(), Status::Succeeded);
}

#[tokio::test]
async fn scenario_2_fail_fast_cancels_downstream() {
    let workflow = Workflow::builder("w2", "v1")
        .then("a", Action::default_action(), "b")
        .then("b", Action::default_action(), "c")
        .build()
        .unwrap();

    let mut registry = StepRegistry::new();
    registry.register("a", AlwaysFails);
    registry.register("b", Echo);
    registry.register("c", Echo);
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage.clone(), workflow, registry));

    let instance_id = driver.dispatch(HashMap::new()).await.unwrap();
    let status = SerialEngine::new(driver).run(&instance_id).await.unwrap();

    assert_eq!(status, Status::Failed);
    assert_eq!(storage.get_state(&instance_id, "a").await.unwrap(), Status::Failed);
    assert_eq!(storage.get_state(&instance_id, "b").await.unwrap(), Status::Cancelled);
    assert_eq!(storage.get_state(&instance_id, "c").await.unwrap(), Status::Cancelled);
}

#[tokio::test]
async fn scenario_3_branch_choice_cancels_the_path_not_taken() {
    let workflow = Workflow::builder("w3", "v1")
        .then("chooser", Action::default_action(), "x")
        .then("chooser", Action::from("skip"), "y")
        .build()
        .unwrap();

    let mut registry = StepRegistry::new();
    registry.register("chooser", Chooser);
    registry.register("x", Echo);
    registry.register("y", Echo);
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage.clone(), workflow, registry));

    let instance_id = driver.dispatch(HashMap::new()).await.unwrap();
    SerialEngine::new(driver).run(&instance_id).await.unwrap();

    assert_eq!(storage.get_state(&instance_id, "y").await.unwrap(), Status::Succeeded);
    assert_eq!(storage.get_state(&instance_id, "x").await.unwrap(), Status::Cancelled);
}

#[tokio::test]
async fn scenario_4_retry_recovers_after_two_failures() {
    let mut builder = Workflow::builder("w4", "v1");
    builder.step("s").retry(3, Duration::ZERO);
    let workflow = builder.build().unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = StepRegistry::new();
    registry.register("s", FlakyTwice(calls.clone()));
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage.clone(), workflow, registry));

    let instance_id = driver.dispatch(HashMap::new()).await.unwrap();
    let status = SerialEngine::new(driver).run(&instance_id).await.unwrap();

    assert_eq!(status, Status::Succeeded);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn scenario_5_and_join_cancels_when_a_branch_fails() {
    let workflow = Workflow::builder("w5", "v1")
        .then("a", Action::default_action(), "c")
        .then("b", Action::default_action(), "c")
        .build()
        .unwrap();

    let mut registry = StepRegistry::new();
    registry.register("a", Echo);
    registry.register("b", AlwaysFails);
    registry.register("c", Echo);
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage.clone(), workflow, registry));

    let instance_id = driver.dispatch(HashMap::new()).await.unwrap();
    let status = SerialEngine::new(driver).run(&instance_id).await.unwrap();

    assert_eq!(status, Status::Failed);
    assert_eq!(storage.get_state(&instance_id, "c").await.unwrap(), Status::Cancelled);
}

#[tokio::test]
async fn scenario_6_typed_dependency_resolves_through_add_and_multiply() {
    struct Add;
    #[async_trait]
    impl StepBody for Add {
        async fn call(&self, inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
            let x = inputs.get("x").and_then(Value::as_f64).ok_or("missing x")?;
            let y = inputs.get("y").and_then(Value::as_f64).ok_or("missing y")?;
            Ok(Value::from(x + y))
        }
    }
    struct Multiply;
    #[async_trait]
    impl StepBody for Multiply {
        async fn call(&self, inputs: &HashMap<String, Value>, _predecessors: &HashMap<SmolStr, Value>) -> Result<Value, String> {
            let value = inputs.get("sum").and_then(Value::as_f64).ok_or("missing resolved binding 'sum'")?;
            Ok(Value::from(value * 2.0))
        }
    }

    let mut builder = Workflow::builder("w6", "v1").input_keys(["x", "y"]).outputs(["multiply"]);
    builder.step("add").depends_on_input("x", "x").depends_on_input("y", "y");
    builder.step("multiply").depends_on("sum", "add");
    let workflow = builder.build().unwrap();

    let mut registry = StepRegistry::new();
    registry.register("add", Add);
    registry.register("multiply", Multiply);
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage.clone(), workflow, registry));

    let inputs = HashMap::from([("x".to_string(), Value::from(2)), ("y".to_string(), Value::from(3))]);
    let instance_id = driver.dispatch(inputs).await.unwrap();
    SerialEngine::new(driver).run(&instance_id).await.unwrap();

    assert_eq!(storage.get_result(&instance_id, "multiply").await.unwrap(), Some(Value::from(10.0)));
}

#[tokio::test]
async fn scenario_7_pool_engine_runs_branches_concurrently() {
    let workflow = Workflow::builder("w7", "v1")
        .then("a", Action::default_action(), "b")
        .then("a", Action::default_action(), "c")
        .build()
        .unwrap();

    let mut registry = StepRegistry::new();
    registry.register("a", Echo);
    registry.register("b", SleepAndEcho(Duration::from_millis(80)));
    registry.register("c", SleepAndEcho(Duration::from_millis(80)));
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage, workflow, registry));

    let instance_id = driver.dispatch(HashMap::new()).await.unwrap();
    let start = std::time::Instant::now();
    let status = PoolEngine::new(driver, 2).run(&instance_id).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(status, Status::Succeeded);
    assert!(elapsed < Duration::from_millis(150), "branches should overlap, took {elapsed:?}");
}

#[tokio::test]
async fn async_engine_also_drains_the_same_fork_join_graph() {
    let workflow = Workflow::builder("w7b", "v1")
        .then("a", Action::default_action(), "b")
        .then("a", Action::default_action(), "c")
        .build()
        .unwrap();

    let mut registry = StepRegistry::new();
    registry.register("a", Echo);
    registry.register("b", Echo);
    registry.register("c", Echo);
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage, workflow, registry));

    let instance_id = driver.dispatch(HashMap::new()).await.unwrap();
    let status = AsyncEngine::new(driver).run(&instance_id).await.unwrap();
    assert_eq!(status, Status::Succeeded);
}

#[tokio::test]
async fn scenario_10_condition_skip_treats_the_step_as_succeeded_downstream() {
    let mut builder = Workflow::builder("w10", "v1");
    builder.step("a").condition(Arc::new(|ctx: &Context<'_>| ctx.get("flag").and_then(|v| v.as_bool()).unwrap_or(false)));
    let workflow = builder.then("a", Action::default_action(), "b").input_keys(["flag"]).build().unwrap();

    let mut registry = StepRegistry::new();
    registry.register("a", Echo);
    registry.register("b", Echo);
    let storage = Arc::new(InMemoryStore::new());
    let driver = Arc::new(GraphDriver::new(storage.clone(), workflow, registry));

    let inputs = HashMap::from([("flag".to_string(), Value::Bool(false))]);
    let instance_id = driver.dispatch(inputs).await.unwrap();
    let status = SerialEngine::new(driver).run(&instance_id).await.unwrap();

    assert_eq!(status, Status::Succeeded);
    assert_eq!(storage.get_state(&instance_id, "a").await.unwrap(), Status::Skipped);
    assert_eq!(storage.get_state(&instance_id, "b").await.unwrap(), Status::Succeeded);
}
