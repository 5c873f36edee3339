// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job functions and the registry that names them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::task::Task;

/// Failure reported by a job function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job failed. The task is dropped and the failure logged.
    #[error("{0}")]
    Failed(String),

    /// The job could not record its own failure. The worker stops so the
    /// process can be restarted; the task stays claimed and is recovered once
    /// the worker's heartbeat expires.
    #[error("{0}")]
    Fatal(String),
}

impl JobError {
    /// Build a [`JobError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }

    /// Build a [`JobError::Fatal`].
    pub fn fatal(message: impl Into<String>) -> Self {
        JobError::Fatal(message.into())
    }

    /// Whether the worker must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::Fatal(_))
    }
}

/// Result of running a job: the follow-up tasks to enqueue.
pub type JobResult = std::result::Result<Vec<Task>, JobError>;

/// A unit of work the engine can dispatch tasks to.
///
/// Implemented for any `Fn(CancellationToken, Task) -> impl Future<Output =
/// JobResult>`, so plain async closures can be registered directly.
#[async_trait]
pub trait JobFn: Send + Sync + 'static {
    /// Run the job for one task.
    async fn call(&self, cancel: CancellationToken, task: Task) -> JobResult;
}

#[async_trait]
impl<F, Fut> JobFn for F
where
    F: Fn(CancellationToken, Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    async fn call(&self, cancel: CancellationToken, task: Task) -> JobResult {
        (self)(cancel, task).await
    }
}

/// Name to job function map, shared between the engine and its executors.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<dyn JobFn>>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job` under `name`. Names are unique.
    pub async fn register(&self, name: impl Into<String>, job: impl JobFn) -> Result<()> {
        let name = name.into();
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&name) {
            return Err(Error::DuplicateJob(name));
        }
        jobs.insert(name, Arc::new(job));
        Ok(())
    }

    /// Look up the job registered under `name`.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn JobFn>> {
        self.jobs.read().await.get(name).cloned()
    }

    /// Registered job names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
