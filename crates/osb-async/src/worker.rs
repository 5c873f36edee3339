// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! A worker: heartbeat plus two claim-and-process pipelines.
//!
//! ```text
//!   pending  ──receiver──►  worker-active:<id>   ──channel──►  N executors
//!   deferred ──receiver──►  worker-watched:<id>  ──channel──►  watcher ──► pending
//!   heartbeats:<id>  ◄──  heart (every interval, TTL 2× interval)
//! ```
//!
//! Subsystems run as sibling tasks under one cancellation token. The first
//! one to fail cancels the rest, and the worker returns that failure tagged
//! with the subsystem's [`Component`].

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Component, Error, Result};
use crate::executor::{SharedReceiver, TaskExecutor};
use crate::heartbeat::Heart;
use crate::job::{JobFn, JobRegistry};
use crate::queues;
use crate::receiver::TaskReceiver;
use crate::store::QueueStore;
use crate::watcher::DeferredTaskWatcher;

/// Claims and runs tasks for the jobs registered on it.
#[derive(Clone)]
pub struct Worker {
    id: String,
    store: Arc<dyn QueueStore>,
    registry: Arc<JobRegistry>,
    config: EngineConfig,
}

impl Worker {
    /// Create a worker with a fresh random ID.
    pub fn new(store: Arc<dyn QueueStore>, config: EngineConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            store,
            registry: Arc::new(JobRegistry::new()),
            config,
        }
    }

    /// Worker ID, as used in queue and heartbeat key names.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Jobs this worker accepts.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Register a job function. Fails if the name is taken.
    pub async fn register_job(&self, name: impl Into<String>, job: impl JobFn) -> Result<()> {
        self.registry.register(name, job).await
    }

    /// Run until `cancel` fires or a subsystem fails.
    ///
    /// The first heartbeat is written before the worker joins the `workers`
    /// set, so a cleaner never sees this worker without a live key. On return
    /// the worker stays registered; its claimed tasks are recovered by a
    /// cleaner once the heartbeat expires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let heart = Heart::new(self.store.clone(), &self.id, self.config.heartbeat_interval);
        heart
            .beat()
            .await
            .map_err(|e| e.stopped(Component::Heartbeat))?;
        self.store.add_member(queues::WORKERS, &self.id).await?;

        let job_names = self.registry.names().await;
        info!(
            worker_id = %self.id,
            pending_concurrency = self.config.pending_concurrency,
            jobs = ?job_names,
            "Worker started"
        );

        let cancel = cancel.child_token();
        let mut subsystems = JoinSet::new();

        {
            let cancel = cancel.clone();
            subsystems.spawn(async move {
                heart
                    .run(cancel)
                    .await
                    .map_err(|e| e.stopped(Component::Heartbeat))
            });
        }

        let (pending_tx, pending_rx) = mpsc::channel(1);
        let pending_rx: SharedReceiver = Arc::new(Mutex::new(pending_rx));
        let pending = TaskReceiver::new(
            self.store.clone(),
            queues::PENDING,
            queues::active(&self.id),
            self.config.receive_timeout,
        );
        {
            let cancel = cancel.clone();
            subsystems.spawn(async move {
                pending
                    .run(cancel, pending_tx)
                    .await
                    .map_err(|e| e.stopped(Component::PendingReceiver))
            });
        }

        let executor = TaskExecutor::new(self.store.clone(), self.registry.clone(), &self.id)
            .with_max_worker_rejections(self.config.max_worker_rejections);
        for _ in 0..self.config.pending_concurrency.max(1) {
            let executor = executor.clone();
            let (cancel, rx) = (cancel.clone(), pending_rx.clone());
            subsystems.spawn(async move {
                executor
                    .run(cancel, rx)
                    .await
                    .map_err(|e| e.stopped(Component::Executor))
            });
        }

        let (deferred_tx, deferred_rx) = mpsc::channel(1);
        let deferred = TaskReceiver::new(
            self.store.clone(),
            queues::DEFERRED,
            queues::watched(&self.id),
            self.config.receive_timeout,
        );
        {
            let cancel = cancel.clone();
            subsystems.spawn(async move {
                deferred
                    .run(cancel, deferred_tx)
                    .await
                    .map_err(|e| e.stopped(Component::DeferredReceiver))
            });
        }

        let watcher = DeferredTaskWatcher::new(self.store.clone(), &self.id);
        {
            let cancel = cancel.clone();
            subsystems.spawn(async move {
                watcher
                    .run(cancel, deferred_rx)
                    .await
                    .map_err(|e| e.stopped(Component::Watcher))
            });
        }

        let result = supervise(&mut subsystems, &cancel, Component::Worker).await;
        info!(worker_id = %self.id, "Worker stopped");
        result
    }
}

/// Wait for every task in `set`. The first failure cancels `cancel` and is
/// returned once all siblings have finished.
pub(crate) async fn supervise(
    set: &mut JoinSet<Result<()>>,
    cancel: &CancellationToken,
    on_panic: Component,
) -> Result<()> {
    let mut first_error = None;

    while let Some(joined) = set.join_next().await {
        let outcome = joined.unwrap_or_else(|e| {
            Err(Error::Panicked {
                component: on_panic,
                message: e.to_string(),
            })
        });
        if let Err(e) = outcome {
            if first_error.is_none() {
                error!(error = %e, "Stopping remaining subsystems");
                first_error = Some(e);
            }
            cancel.cancel();
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
