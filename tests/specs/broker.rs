//! Broker scheduling scenarios (§8, items 8-9): lease reclaim and schema
//! conflict rejection, exercised through [`weft_broker::Broker`] directly.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use weft_broker::Broker;
use weft_core::{Action, Context, FakeClock, JoinMode, Status, StepReport, WeftError, Workflow, WorkflowId, WorkflowKey};
use weft_storage::{InMemoryStore, RuntimeStorage};

fn linear_workflow() -> Workflow {
    Workflow::builder("spec8", "v1").then("a", Action::default_action(), "b").outputs(["b"]).build().unwrap()
}

#[tokio::test]
async fn scenario_8_expired_lease_is_reclaimed_and_step_completes_on_the_second_worker() {
    let clock = FakeClock::new();
    let broker = Broker::with_clock(Arc::new(InMemoryStore::new()), clock.clone()).with_default_lease(Duration::from_secs(5));
    broker.register_workflow(linear_workflow()).unwrap();
    let key = WorkflowKey::new(WorkflowId::new("spec8"), "v1".to_string());

    let (worker_a, _) = broker.register_worker(vec![linear_workflow()]).await.unwrap();
    let (worker_b, _) = broker.register_worker(vec![linear_workflow()]).await.unwrap();
    let instance_id = broker.dispatch(&key, HashMap::new()).await.unwrap();

    // Worker A leases step "a" and then disappears without reporting.
    let first = broker.get_step(&worker_a).await.unwrap().expect("step a ready");
    assert_eq!(first.step, "a");
    assert_eq!(first.attempt, 0);

    clock.advance(Duration::from_secs(6));
    broker.reap_leases().await.unwrap();

    // Worker B picks up the reclaimed step and completes it.
    let second = broker.get_step(&worker_b).await.unwrap().expect("step a reclaimed and re-leased");
    assert_eq!(second.step, "a");
    assert_eq!(second.attempt, 1, "body invoked at most twice total: once per lease");

    broker.report_step(&worker_b, &instance_id, "a", StepReport::Succeeded { result: Value::from(1) }).await.unwrap();

    // Worker A's now-stale lease can no longer complete the step.
    let err = broker.report_step(&worker_a, &instance_id, "a", StepReport::Succeeded { result: Value::from(99) }).await;
    assert!(err.is_ok(), "a terminal step re-report is an idempotent no-op, not an error");

    let b_assignment = broker.get_step(&worker_b).await.unwrap().expect("step b ready");
    assert_eq!(b_assignment.step, "b");
}

#[tokio::test]
async fn scenario_9_conflicting_schema_is_rejected_and_original_is_unchanged() {
    let broker = Broker::new(Arc::new(InMemoryStore::new()));
    broker.register_workflow(linear_workflow()).unwrap();
    let key = WorkflowKey::new(WorkflowId::new("spec8"), "v1".to_string());

    let mut conflicting =
        Workflow::builder("spec8", "v1").then("a", Action::default_action(), "c").outputs(["c"]).build().unwrap();
    conflicting.steps.get_mut("a").unwrap().join_mode = JoinMode::Or;

    let err = broker.register_worker(vec![conflicting]).await.unwrap_err();
    assert!(matches!(err, WeftError::SchemaConflict(_)));

    let original = broker.workflow(&key).expect("original schema still registered");
    assert!(original.steps.contains_key("b"), "original schema unchanged by the rejected conflicting one");
}

#[tokio::test]
async fn scenario_10_dependency_binding_resolves_through_a_leased_assignment() {
    let mut builder = Workflow::builder("dibind", "v1").input_keys(["x", "y"]);
    builder.step("add").depends_on_input("x", "x").depends_on_input("y", "y");
    builder.step("double").depends_on("sum", "add");
    let workflow = builder.outputs(["double"]).build().unwrap();

    let broker = Broker::new(Arc::new(InMemoryStore::new()));
    broker.register_workflow(workflow.clone()).unwrap();
    let key = WorkflowKey::new(WorkflowId::new("dibind"), "v1".to_string());
    let (worker_id, _) = broker.register_worker(vec![workflow]).await.unwrap();

    let instance_id =
        broker.dispatch(&key, HashMap::from([("x".to_string(), Value::from(2)), ("y".to_string(), Value::from(3))])).await.unwrap();

    let assignment = broker.get_step(&worker_id).await.unwrap().expect("add ready");
    assert_eq!(assignment.step, "add");
    assert_eq!(assignment.inputs.get("x"), Some(&Value::from(2)));
    assert_eq!(assignment.inputs.get("y"), Some(&Value::from(3)));

    broker.report_step(&worker_id, &instance_id, "add", StepReport::Succeeded { result: Value::from(5) }).await.unwrap();

    let assignment = broker.get_step(&worker_id).await.unwrap().expect("double ready");
    assert_eq!(assignment.step, "double");
    assert_eq!(assignment.inputs.get("sum"), Some(&Value::from(5)), "'sum' is add's resolved result, assembled under its declared param name");
}

#[tokio::test]
async fn scenario_11_unresolved_binding_against_a_skipped_predecessor_fails_the_step_at_lease_time() {
    let mut builder = Workflow::builder("skipbind", "v1").input_keys(["go"]);
    builder
        .step("gate")
        .condition(Arc::new(|ctx: &Context<'_>| ctx.get("go").and_then(|v| v.as_bool()).unwrap_or(false)));
    builder.step("consumer").depends_on("value", "gate");
    let workflow = builder.outputs(["consumer"]).build().unwrap();

    let storage = Arc::new(InMemoryStore::new());
    let broker = Broker::new(storage.clone());
    broker.register_workflow(workflow.clone()).unwrap();
    let key = WorkflowKey::new(WorkflowId::new("skipbind"), "v1".to_string());
    let (worker_id, _) = broker.register_worker(vec![workflow]).await.unwrap();

    let instance_id = broker.dispatch(&key, HashMap::from([("go".to_string(), Value::Bool(false))])).await.unwrap();

    // "gate" is skipped (its condition is false), which satisfies "consumer"'s
    // AND-join — but "gate" never deposits a stored result, so "consumer"'s
    // binding to it cannot resolve. It must fail immediately rather than be
    // handed to a worker with a half-assembled payload.
    assert!(broker.get_step(&worker_id).await.unwrap().is_none(), "consumer fails at lease time, never leased");
    assert_eq!(storage.get_state(&instance_id, "gate").await.unwrap(), Status::Skipped);
    assert_eq!(storage.get_state(&instance_id, "consumer").await.unwrap(), Status::Failed);
}
