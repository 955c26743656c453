// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Thin `reqwest` wrapper over the broker's §6 HTTP surface for the admin
//! subcommands (`status`, `workers`, `workflows`, `dispatch`).

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;

pub struct AdminClient {
    base_url: String,
    http: reqwest::Client,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: reqwest::Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let resp = self.http.get(self.url(path)).send().await.context("request failed")?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("broker returned {status}: {body}");
        }
        serde_json::from_str(&body).context("failed to decode broker response")
    }

    pub async fn status(&self) -> Result<Value> {
        self.get_json("/status").await
    }

    pub async fn workers(&self) -> Result<Value> {
        self.get_json("/workers").await
    }

    pub async fn workflows(&self) -> Result<Value> {
        self.get_json("/workflows").await
    }

    pub async fn dispatch(&self, workflow_id: &str, version: &str, inputs: HashMap<String, Value>) -> Result<String> {
        let body = serde_json::json!({ "workflow_id": workflow_id, "version": version, "inputs": inputs });
        let resp = self.http.post(self.url("/workflow/dispatch")).json(&body).send().await.context("request failed")?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("broker returned {status}: {text}");
        }
        serde_json::from_str(&text).context("failed to decode instance id")
    }
}
