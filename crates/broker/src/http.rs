// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! `axum` HTTP veneer over the broker's §6 surface.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use weft_core::{InstanceId, StepReport, WeftError, WorkerId, WorkflowId, WorkflowKey, WorkflowSchema};
use weft_storage::RuntimeStorage;

use crate::repository::RepositoryEntry;
use crate::scheduler::Broker;

pub fn router<S: RuntimeStorage>(broker: Arc<Broker<S>>) -> Router {
    Router::new()
        .route("/worker/register", post(register_worker::<S>))
        .route("/worker/keep-alive", post(keep_alive::<S>))
        .route("/workflow/dispatch", post(dispatch::<S>))
        .route("/workflow/step", get(get_step::<S>).post(report_step::<S>))
        .route("/status", get(status))
        .route("/workers", get(list_workers::<S>))
        .route("/workflows", get(list_workflows::<S>))
        .route("/repository/register", post(register_repository::<S>))
        .route("/repository", get(get_repository::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(broker)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

fn error_response(err: WeftError) -> Response {
    use WeftError::*;
    let status = match &err {
        GraphConstruction(_) | InputValidation(_) | SchemaConflict(_) => StatusCode::BAD_REQUEST,
        Lease(_) => StatusCode::CONFLICT,
        UnknownWorkflow(..) | UnknownInstance(_) | UnknownWorker(_) | RepositoryDeclaredNoSchema(..) => {
            StatusCode::NOT_FOUND
        }
        Storage(_) | StepExecution(_) | Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: "weft_error", detail: err.to_string() })).into_response()
}

async fn register_worker<S: RuntimeStorage>(
    State(broker): State<Arc<Broker<S>>>,
    Json(schemas): Json<Vec<WorkflowSchema>>,
) -> Response {
    let workflows: Result<Vec<_>, _> = schemas.into_iter().map(|s| s.into_workflow()).collect();
    let workflows = match workflows {
        Ok(w) => w,
        Err(e) => return error_response(e.into()),
    };
    match broker.register_worker(workflows).await {
        Ok((worker_id, _)) => Json(worker_id.to_string()).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct KeepAliveBody {
    worker_id: String,
}

async fn keep_alive<S: RuntimeStorage>(State(broker): State<Arc<Broker<S>>>, Json(body): Json<KeepAliveBody>) -> Response {
    match broker.keep_alive(&WorkerId::from_string(body.worker_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct DispatchBody {
    workflow_id: String,
    version: String,
    inputs: HashMap<String, Value>,
}

async fn dispatch<S: RuntimeStorage>(State(broker): State<Arc<Broker<S>>>, Json(body): Json<DispatchBody>) -> Response {
    let key = WorkflowKey::new(WorkflowId::new(body.workflow_id), body.version);
    match broker.dispatch(&key, body.inputs).await {
        Ok(instance_id) => Json(instance_id.to_string()).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct WorkerIdQuery {
    worker_id: String,
}

async fn get_step<S: RuntimeStorage>(State(broker): State<Arc<Broker<S>>>, Query(q): Query<WorkerIdQuery>) -> Response {
    match broker.get_step(&WorkerId::from_string(q.worker_id)).await {
        Ok(Some(assignment)) => Json(assignment).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct StepReportBody {
    instance_id: String,
    step_name: String,
    #[serde(flatten)]
    report: StepReport,
}

async fn report_step<S: RuntimeStorage>(
    State(broker): State<Arc<Broker<S>>>,
    Query(q): Query<WorkerIdQuery>,
    Json(body): Json<StepReportBody>,
) -> Response {
    let worker_id = WorkerId::from_string(q.worker_id);
    let instance_id = InstanceId::from_string(body.instance_id);
    match broker.report_step(&worker_id, &instance_id, &body.step_name, body.report).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn status() -> Response {
    Json(serde_json::json!({"status": "ok"})).into_response()
}

async fn list_workers<S: RuntimeStorage>(State(broker): State<Arc<Broker<S>>>) -> Response {
    Json(broker.workers()).into_response()
}

async fn list_workflows<S: RuntimeStorage>(State(broker): State<Arc<Broker<S>>>) -> Response {
    let schemas: Vec<WorkflowSchema> = broker.workflows().iter().map(|w| w.to_schema()).collect();
    Json(schemas).into_response()
}

async fn register_repository<S: RuntimeStorage>(
    State(broker): State<Arc<Broker<S>>>,
    Json(entry): Json<RepositoryEntry>,
) -> Response {
    broker.repository.register(entry);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
struct RepositoryQuery {
    name: String,
}

async fn get_repository<S: RuntimeStorage>(State(broker): State<Arc<Broker<S>>>, Query(q): Query<RepositoryQuery>) -> Response {
    match broker.repository.get(&q.name) {
        Some(entry) => Json(entry).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
