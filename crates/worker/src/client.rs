// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! `BrokerClient` (§4.5): the worker's view of the broker, with an HTTP
//! implementation for real deployments and an in-process one for tests and
//! single-binary deployments that want broker semantics without a network
//! hop.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use weft_broker::Broker;
use weft_core::{Assignment, InstanceId, StepReport, WeftError, WorkerId, WorkerRegistration, Workflow};
use weft_storage::RuntimeStorage;

#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn register_worker(&self, workflows: Vec<Workflow>) -> Result<(WorkerId, WorkerRegistration), WeftError>;
    async fn keep_alive(&self, worker_id: &WorkerId) -> Result<(), WeftError>;
    async fn get_step(&self, worker_id: &WorkerId) -> Result<Option<Assignment>, WeftError>;
    async fn report_step(
        &self,
        worker_id: &WorkerId,
        instance_id: &InstanceId,
        step: &str,
        report: StepReport,
    ) -> Result<(), WeftError>;
}

/// Talks to an in-process [`Broker`] directly — no network hop, used by
/// single-process deployments and by tests.
pub struct LocalBrokerClient<S: RuntimeStorage> {
    broker: Arc<Broker<S>>,
}

impl<S: RuntimeStorage> LocalBrokerClient<S> {
    pub fn new(broker: Arc<Broker<S>>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl<S: RuntimeStorage> BrokerClient for LocalBrokerClient<S> {
    async fn register_worker(&self, workflows: Vec<Workflow>) -> Result<(WorkerId, WorkerRegistration), WeftError> {
        self.broker.register_worker(workflows).await
    }

    async fn keep_alive(&self, worker_id: &WorkerId) -> Result<(), WeftError> {
        self.broker.keep_alive(worker_id)
    }

    async fn get_step(&self, worker_id: &WorkerId) -> Result<Option<Assignment>, WeftError> {
        self.broker.get_step(worker_id).await
    }

    async fn report_step(
        &self,
        worker_id: &WorkerId,
        instance_id: &InstanceId,
        step: &str,
        report: StepReport,
    ) -> Result<(), WeftError> {
        self.broker.report_step(worker_id, instance_id, step, report).await
    }
}

/// Talks to a remote broker over the §6 HTTP surface via `reqwest`.
pub struct HttpBrokerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBrokerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: reqwest::Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, WeftError> {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(weft_core::StorageError(format!("broker returned {status}: {body}")).into());
        }
        serde_json::from_str(&body)
            .map_err(|e| weft_core::StorageError(format!("failed to decode broker response: {e}")).into())
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn register_worker(&self, workflows: Vec<Workflow>) -> Result<(WorkerId, WorkerRegistration), WeftError> {
        let schemas: Vec<_> = workflows.iter().map(|w| w.to_schema()).collect();
        let resp = self
            .http
            .post(self.url("/worker/register"))
            .json(&schemas)
            .send()
            .await
            .map_err(|e| weft_core::StorageError(e.to_string()))?;
        let worker_id_str: String = Self::decode(resp).await?;
        let worker_id = WorkerId::from_string(worker_id_str);
        Ok((worker_id, WorkerRegistration { worker_id, capabilities: Vec::new(), registered_at_ms: 0 }))
    }

    async fn keep_alive(&self, worker_id: &WorkerId) -> Result<(), WeftError> {
        let body = HashMap::from([("worker_id", worker_id.to_string())]);
        let resp = self
            .http
            .post(self.url("/worker/keep-alive"))
            .json(&body)
            .send()
            .await
            .map_err(|e| weft_core::StorageError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(weft_core::StorageError(format!("keep_alive failed: {}", resp.status())).into());
        }
        Ok(())
    }

    async fn get_step(&self, worker_id: &WorkerId) -> Result<Option<Assignment>, WeftError> {
        let resp = self
            .http
            .get(self.url("/workflow/step"))
            .query(&[("worker_id", worker_id.to_string())])
            .send()
            .await
            .map_err(|e| weft_core::StorageError(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Self::decode(resp).await
    }

    async fn report_step(
        &self,
        worker_id: &WorkerId,
        instance_id: &InstanceId,
        step: &str,
        report: StepReport,
    ) -> Result<(), WeftError> {
        #[derive(serde::Serialize)]
        struct Body<'a> {
            instance_id: String,
            step_name: &'a str,
            #[serde(flatten)]
            report: StepReport,
        }
        let resp = self
            .http
            .post(self.url("/workflow/step"))
            .query(&[("worker_id", worker_id.to_string())])
            .json(&Body { instance_id: instance_id.to_string(), step_name: step, report })
            .send()
            .await
            .map_err(|e| weft_core::StorageError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(weft_core::StorageError(format!("report_step failed: {}", resp.status())).into());
        }
        Ok(())
    }
}
