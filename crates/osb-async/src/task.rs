// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The unit of work moved between queues.
//!
//! A task is stored in Redis as one flat JSON object:
//!
//! ```json
//! {
//!   "id": "5f1c...",
//!   "jobName": "executeProvisioningStep",
//!   "args": {"stepName": "createVM", "instanceID": "abc"},
//!   "executeTime": "2025-01-01T00:00:00Z",
//!   "workerRejectionCount": 0
//! }
//! ```
//!
//! `executeTime` is omitted for tasks that may run immediately. The serialized
//! string is also the task's identity inside a queue: removals match on the
//! exact bytes that were pushed.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named job invocation with string arguments and an optional start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: String,
    job_name: String,
    #[serde(default)]
    args: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    execute_time: Option<DateTime<Utc>>,
    #[serde(default)]
    worker_rejection_count: u32,
}

impl Task {
    /// Create a task that may run as soon as a worker picks it up.
    pub fn new(job_name: impl Into<String>, args: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_name: job_name.into(),
            args,
            execute_time: None,
            worker_rejection_count: 0,
        }
    }

    /// Create a task that must not run before `delay` has elapsed.
    pub fn delayed(
        job_name: impl Into<String>,
        args: HashMap<String, String>,
        delay: Duration,
    ) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let execute_time = Utc::now()
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            execute_time: Some(execute_time),
            ..Self::new(job_name, args)
        }
    }

    /// Create a task that must not run before `execute_time`.
    pub fn scheduled(
        job_name: impl Into<String>,
        args: HashMap<String, String>,
        execute_time: DateTime<Utc>,
    ) -> Self {
        Self {
            execute_time: Some(execute_time),
            ..Self::new(job_name, args)
        }
    }

    /// Unique task ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the job function that handles this task.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// All task arguments.
    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }

    /// Look up a single argument.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    /// Earliest time the task may run, if deferred.
    pub fn execute_time(&self) -> Option<DateTime<Utc>> {
        self.execute_time
    }

    /// Whether the task goes through the deferred queue.
    pub fn is_deferred(&self) -> bool {
        self.execute_time.is_some()
    }

    /// How many workers have rejected the task for lack of a matching job.
    pub fn worker_rejection_count(&self) -> u32 {
        self.worker_rejection_count
    }

    /// Record one more worker rejection.
    pub fn increment_worker_rejection_count(&mut self) {
        self.worker_rejection_count = self.worker_rejection_count.saturating_add(1);
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from the wire format.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
