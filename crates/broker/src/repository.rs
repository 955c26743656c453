// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! In-memory registry backing `/repository/register` and `GET /repository` (§6).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub name: String,
    pub url: String,
    pub workflows: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

#[derive(Default)]
pub struct RepositoryRegistry {
    entries: DashMap<String, RepositoryEntry>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: RepositoryEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<RepositoryEntry> {
        self.entries.get(name).map(|e| e.clone())
    }

    /// Does any registered repository declare `workflow_id`? Used by dispatch
    /// validation alongside direct worker registration (§6).
    pub fn declares(&self, workflow_id: &str) -> bool {
        self.entries.iter().any(|e| e.workflows.iter().any(|w| w == workflow_id))
    }
}
