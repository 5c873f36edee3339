// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The engine: one worker and one cleaner per process.
//!
//! # Example
//!
//! ```rust,ignore
//! use osb_async::{Config, Engine, JobError, Task};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::from_env()?;
//! let engine = Engine::connect(&config).await?;
//!
//! engine
//!     .register_job("sendReport", |_cancel: CancellationToken, task: Task| async move {
//!         // ... do the work ...
//!         Ok::<_, JobError>(Vec::new())
//!     })
//!     .await?;
//!
//! let handle = engine.start();
//! engine.submit_task(&Task::new("sendReport", Default::default())).await?;
//! // ...
//! handle.shutdown().await?;
//! ```

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cleaner::Cleaner;
use crate::config::{Config, EngineConfig};
use crate::error::{Component, Error, Result};
use crate::job::{JobFn, JobRegistry};
use crate::queues;
use crate::store::{QueueStore, RedisStore};
use crate::task::Task;
use crate::worker::{Worker, supervise};

/// Enqueues tasks without owning an engine.
#[derive(Clone)]
pub struct TaskSubmitter {
    store: Arc<dyn QueueStore>,
}

impl TaskSubmitter {
    /// Create a submitter writing to `store`.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Enqueue `task` on `deferred` if it has an execute time, else `pending`.
    pub async fn submit(&self, task: &Task) -> Result<()> {
        let queue = if task.is_deferred() {
            queues::DEFERRED
        } else {
            queues::PENDING
        };
        self.store.push(queue, &task.to_json()?).await?;
        debug!(
            task_id = %task.id(),
            job_name = %task.job_name(),
            queue,
            "Task submitted"
        );
        Ok(())
    }
}

/// Queue lengths at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueDepths {
    /// Tasks ready to run.
    pub pending: usize,
    /// Tasks waiting for their execute time and not yet claimed.
    pub deferred: usize,
    /// Tasks parked after too many rejections.
    pub dead_letter: usize,
    /// Registered workers, dead or alive.
    pub workers: usize,
}

/// Task engine for one process.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn QueueStore>,
    worker: Worker,
    cleaner: Cleaner,
}

impl Engine {
    /// Create an engine over an existing store.
    pub fn new(store: Arc<dyn QueueStore>, config: EngineConfig) -> Self {
        Self {
            cleaner: Cleaner::new(store.clone(), config.cleaning_interval),
            worker: Worker::new(store.clone(), config),
            store,
        }
    }

    /// Connect to Redis and create an engine.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = RedisStore::connect(&config.redis_url).await?;
        Ok(Self::new(Arc::new(store), config.engine.clone()))
    }

    /// ID of this engine's worker.
    pub fn worker_id(&self) -> &str {
        self.worker.id()
    }

    /// The queue store this engine runs on.
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Jobs this engine's worker can run.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        self.worker.registry()
    }

    /// Register a job function on this engine's worker.
    pub async fn register_job(&self, name: impl Into<String>, job: impl JobFn) -> Result<()> {
        self.worker.register_job(name, job).await
    }

    /// Enqueue a task.
    pub async fn submit_task(&self, task: &Task) -> Result<()> {
        self.submitter().submit(task).await
    }

    /// Handle for enqueueing tasks from elsewhere.
    pub fn submitter(&self) -> TaskSubmitter {
        TaskSubmitter::new(self.store.clone())
    }

    /// Current queue lengths.
    pub async fn queue_depths(&self) -> Result<QueueDepths> {
        Ok(QueueDepths {
            pending: self.store.len(queues::PENDING).await?,
            deferred: self.store.len(queues::DEFERRED).await?,
            dead_letter: self.store.len(queues::DEAD_LETTER).await?,
            workers: self.store.members(queues::WORKERS).await?.len(),
        })
    }

    /// Run the cleaner and worker until `cancel` fires or one of them fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(worker_id = %self.worker.id(), "Engine started");

        let cancel = cancel.child_token();
        let mut parts = JoinSet::new();
        {
            let (cleaner, cancel) = (self.cleaner.clone(), cancel.clone());
            parts.spawn(async move {
                cleaner
                    .run(cancel)
                    .await
                    .map_err(|e| e.stopped(Component::Cleaner))
            });
        }
        {
            let (worker, cancel) = (self.worker.clone(), cancel.clone());
            parts.spawn(async move {
                worker.run(cancel).await.map_err(|e| match e {
                    stopped @ (Error::Stopped { .. } | Error::Panicked { .. }) => stopped,
                    other => other.stopped(Component::Worker),
                })
            });
        }

        let result = supervise(&mut parts, &cancel, Component::Worker).await;
        info!(worker_id = %self.worker.id(), "Engine stopped");
        result
    }

    /// Run the engine in the background.
    pub fn start(&self) -> EngineHandle {
        let cancel = CancellationToken::new();
        let engine = self.clone();
        let join = {
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.run(cancel).await })
        };
        EngineHandle {
            cancel,
            join,
            submitter: self.submitter(),
        }
    }
}

/// A running engine.
pub struct EngineHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<()>>,
    submitter: TaskSubmitter,
}

impl EngineHandle {
    /// Handle for enqueueing tasks.
    pub fn submitter(&self) -> &TaskSubmitter {
        &self.submitter
    }

    /// Whether the engine has stopped, on its own or otherwise.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the engine and wait for it to finish.
    ///
    /// Returns the error that stopped the engine early, if any.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down engine");
        self.cancel.cancel();
        self.join.await.map_err(|e| Error::Panicked {
            component: Component::Worker,
            message: e.to_string(),
        })?
    }
}
