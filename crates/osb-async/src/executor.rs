// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runs claimed tasks and commits their outcome.
//!
//! Outcomes, all committed in one transaction so the claimed task leaves the
//! active queue exactly when its follow-ups become visible:
//!
//! | Situation | Queue effect |
//! |-----------|--------------|
//! | Payload is not a task | removed from active |
//! | No job registered under the name | rejection count + 1, moved back to `pending` (or `dead-letter` past the cap) |
//! | Job failed or panicked | removed from active, no follow-ups |
//! | Job failed during shutdown | left in active for the cleaner |
//! | Job failed fatally | left in active, executor stops |
//! | Job succeeded | removed from active, follow-ups pushed to `pending` / `deferred` |

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::job::{JobError, JobFn, JobRegistry, JobResult};
use crate::queues;
use crate::store::{QueueOp, QueueStore};
use crate::task::Task;

/// Shared receiving end of a worker's pending channel.
pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<String>>>;

/// Executes tasks from a worker's active queue.
#[derive(Clone)]
pub struct TaskExecutor {
    store: Arc<dyn QueueStore>,
    registry: Arc<JobRegistry>,
    worker_id: String,
    active_queue: String,
    max_worker_rejections: Option<u32>,
}

impl TaskExecutor {
    /// Create an executor for `worker_id`.
    pub fn new(
        store: Arc<dyn QueueStore>,
        registry: Arc<JobRegistry>,
        worker_id: impl Into<String>,
    ) -> Self {
        let worker_id = worker_id.into();
        Self {
            store,
            registry,
            active_queue: queues::active(&worker_id),
            worker_id,
            max_worker_rejections: None,
        }
    }

    /// Park tasks in `dead-letter` once they have been rejected more than
    /// `max` times.
    pub fn with_max_worker_rejections(mut self, max: Option<u32>) -> Self {
        self.max_worker_rejections = max;
        self
    }

    /// Execute payloads from `rx` until cancelled or the channel closes.
    ///
    /// Several executors may share one receiver; each takes the next payload
    /// when it is free.
    pub async fn run(&self, cancel: CancellationToken, rx: SharedReceiver) -> Result<()> {
        debug!(worker_id = %self.worker_id, "Task executor started");

        loop {
            let next = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    payload = rx.recv() => payload,
                }
            };
            let Some(payload) = next else {
                break;
            };
            self.execute(&cancel, &payload).await?;
        }

        debug!(worker_id = %self.worker_id, "Task executor stopping");
        Ok(())
    }

    /// Execute one claimed payload.
    ///
    /// Returns an error only when the store fails or the job failed fatally;
    /// everything else is absorbed and logged.
    pub async fn execute(&self, cancel: &CancellationToken, payload: &str) -> Result<()> {
        let task = match Task::from_json(payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(
                    worker_id = %self.worker_id,
                    error = %e,
                    "Discarding malformed task"
                );
                self.store.remove(&self.active_queue, payload).await?;
                return Ok(());
            }
        };

        let Some(job) = self.registry.get(task.job_name()).await else {
            return self.reject(task, payload).await;
        };

        debug!(
            worker_id = %self.worker_id,
            task_id = %task.id(),
            job_name = %task.job_name(),
            "Executing task"
        );

        let follow_ups = match run_isolated(job, cancel.child_token(), task.clone()).await {
            Ok(follow_ups) => follow_ups,
            Err(JobError::Fatal(message)) => {
                error!(
                    worker_id = %self.worker_id,
                    task_id = %task.id(),
                    job_name = %task.job_name(),
                    error = %message,
                    "Job failed fatally"
                );
                return Err(Error::FatalJob {
                    job_name: task.job_name().to_string(),
                    message,
                });
            }
            Err(JobError::Failed(message)) if cancel.is_cancelled() => {
                info!(
                    task_id = %task.id(),
                    job_name = %task.job_name(),
                    error = %message,
                    "Job interrupted by shutdown; leaving task for recovery"
                );
                return Ok(());
            }
            Err(JobError::Failed(message)) => {
                error!(
                    worker_id = %self.worker_id,
                    task_id = %task.id(),
                    job_name = %task.job_name(),
                    error = %message,
                    "Job failed"
                );
                Vec::new()
            }
        };

        let mut ops = Vec::with_capacity(follow_ups.len() + 1);
        ops.push(QueueOp::remove(&self.active_queue, payload));
        for follow_up in &follow_ups {
            match follow_up.to_json() {
                Ok(json) => {
                    let queue = if follow_up.is_deferred() {
                        queues::DEFERRED
                    } else {
                        queues::PENDING
                    };
                    ops.push(QueueOp::push(queue, json));
                }
                Err(e) => error!(
                    task_id = %follow_up.id(),
                    job_name = %follow_up.job_name(),
                    error = %e,
                    "Dropping follow-up task that failed to serialize"
                ),
            }
        }

        self.store.commit(&ops).await?;
        Ok(())
    }

    async fn reject(&self, mut task: Task, payload: &str) -> Result<()> {
        task.increment_worker_rejection_count();
        let rejections = task.worker_rejection_count();

        let queue = match self.max_worker_rejections {
            Some(max) if rejections > max => {
                error!(
                    task_id = %task.id(),
                    job_name = %task.job_name(),
                    rejections,
                    "No worker accepts task; moving to dead-letter queue"
                );
                queues::DEAD_LETTER
            }
            _ => {
                warn!(
                    worker_id = %self.worker_id,
                    task_id = %task.id(),
                    job_name = %task.job_name(),
                    rejections,
                    "No job registered for task; requeueing"
                );
                queues::PENDING
            }
        };

        self.store
            .commit(&[
                QueueOp::push(queue, task.to_json()?),
                QueueOp::remove(&self.active_queue, payload),
            ])
            .await?;
        Ok(())
    }
}

/// Run `job` on its own tokio task so a panic stays inside that task.
/// A panic is reported as an ordinary failure.
async fn run_isolated(job: Arc<dyn JobFn>, cancel: CancellationToken, task: Task) -> JobResult {
    match tokio::spawn(async move { job.call(cancel, task).await }).await {
        Ok(result) => result,
        Err(e) => Err(JobError::failed(format!("job did not complete: {e}"))),
    }
}
