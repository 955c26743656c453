// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Status enumeration shared by steps and workflows, and its transition rule.

use serde::{Deserialize, Serialize};

/// `PENDING -> RUNNING -> {SUCCEEDED | FAILED | CANCELLED | SKIPPED}`.
///
/// Transitions are strictly forward; terminal states are final for a given
/// attempt (a step may be re-entered on a fresh attempt via retry or lease
/// reclaim, which resets it to `Pending` rather than un-terminalizing it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Skipped,
}

crate::simple_display! {
    Status {
        Pending => "PENDING",
        Running => "RUNNING",
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
        Skipped => "SKIPPED",
    }
}

impl Status {
    /// Terminal states are final for a given attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Succeeded | Status::Failed | Status::Cancelled | Status::Skipped)
    }

    /// Terminal states that count as "this branch made progress" for join
    /// evaluation (succeeded or skipped, never failed/cancelled).
    pub fn is_successful_terminal(self) -> bool {
        matches!(self, Status::Succeeded | Status::Skipped)
    }

    /// Whether `self -> next` is an allowed forward transition.
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;
        match (self, next) {
            (Pending, Running) | (Pending, Skipped) | (Pending, Cancelled) => true,
            (Running, Succeeded) | (Running, Failed) | (Running, Cancelled) => true,
            // Idempotent terminal re-reports are accepted by callers but are
            // not a *transition*; same-state is not itself forward progress.
            (a, b) if a == b && a.is_terminal() => false,
            _ => false,
        }
    }

    /// Aggregate workflow status: `Succeeded` iff every step is `Succeeded`
    /// or `Skipped`; otherwise `Failed`. Only meaningful once every step has
    /// reached a terminal state.
    pub fn aggregate<'a>(steps: impl IntoIterator<Item = &'a Status>) -> Status {
        let mut any = false;
        for s in steps {
            any = true;
            if !s.is_successful_terminal() {
                return Status::Failed;
            }
        }
        if any {
            Status::Succeeded
        } else {
            Status::Failed
        }
    }
}
