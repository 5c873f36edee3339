// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Releases deferred tasks once their execute time arrives.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Component, Error, Result};
use crate::queues;
use crate::store::{QueueOp, QueueStore};
use crate::task::Task;

/// Holds each deferred task on a timer and moves it to `pending` when due.
///
/// Every received task gets its own timer, so a task due in a minute is never
/// stuck behind one due in an hour. Tasks still waiting at shutdown stay in
/// the worker's watched queue until the cleaner returns them to `deferred`.
#[derive(Clone)]
pub struct DeferredTaskWatcher {
    store: Arc<dyn QueueStore>,
    watched_queue: String,
}

impl DeferredTaskWatcher {
    /// Create a watcher for `worker_id`.
    pub fn new(store: Arc<dyn QueueStore>, worker_id: &str) -> Self {
        Self {
            store,
            watched_queue: queues::watched(worker_id),
        }
    }

    /// Start a timer for every payload from `rx` until cancelled.
    ///
    /// Returns the first store error any timer hits.
    pub async fn run(&self, cancel: CancellationToken, mut rx: mpsc::Receiver<String>) -> Result<()> {
        debug!(queue = %self.watched_queue, "Deferred task watcher started");
        let mut timers = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                Some(joined) = timers.join_next(), if !timers.is_empty() => {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => break Err(e),
                        Err(e) => break Err(Error::Panicked {
                            component: Component::Watcher,
                            message: e.to_string(),
                        }),
                    }
                }
                payload = rx.recv() => match payload {
                    Some(payload) => {
                        let watcher = self.clone();
                        let cancel = cancel.clone();
                        timers.spawn(async move { watcher.watch(&cancel, &payload).await });
                    }
                    None => break Ok(()),
                },
            }
        };

        timers.shutdown().await;
        debug!(queue = %self.watched_queue, "Deferred task watcher stopping");
        outcome
    }

    /// Wait for one payload's execute time, then move it to `pending`.
    pub async fn watch(&self, cancel: &CancellationToken, payload: &str) -> Result<()> {
        let task = match Task::from_json(payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "Discarding malformed deferred task");
                self.store.remove(&self.watched_queue, payload).await?;
                return Ok(());
            }
        };

        let Some(execute_time) = task.execute_time() else {
            error!(
                task_id = %task.id(),
                job_name = %task.job_name(),
                "Deferred task has no execute time; discarding"
            );
            self.store.remove(&self.watched_queue, payload).await?;
            return Ok(());
        };

        // Past execute times yield a negative delta, which is released at once.
        let wait = (execute_time - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(wait) => {}
        }

        self.store
            .commit(&[
                QueueOp::push(queues::PENDING, payload),
                QueueOp::remove(&self.watched_queue, payload),
            ])
            .await?;
        debug!(
            task_id = %task.id(),
            job_name = %task.job_name(),
            "Deferred task is due"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashMap;
    use std::time::Duration;

    const WORKER: &str = "w1";

    async fn watched(store: &MemoryStore, task: &Task) -> String {
        let payload = task.to_json().unwrap();
        store.push(&queues::watched(WORKER), &payload).await.unwrap();
        payload
    }

    #[tokio::test]
    async fn test_past_execute_time_is_released_immediately() {
        let store = Arc::new(MemoryStore::new());
        let task = Task::scheduled(
            "jobC",
            HashMap::new(),
            Utc::now() - chrono::Duration::seconds(30),
        );
        let payload = watched(&store, &task).await;

        let watcher = DeferredTaskWatcher::new(store.clone(), WORKER);
        watcher
            .watch(&CancellationToken::new(), &payload)
            .await
            .unwrap();

        assert_eq!(store.list(queues::PENDING).await.unwrap(), vec![payload]);
        assert_eq!(store.len(&queues::watched(WORKER)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_future_task_waits_for_execute_time() {
        let store = Arc::new(MemoryStore::new());
        let task = Task::delayed("jobC", HashMap::new(), Duration::from_millis(1500));
        let payload = watched(&store, &task).await;

        let watcher = DeferredTaskWatcher::new(store.clone(), WORKER);
        let handle = {
            let payload = payload.clone();
            tokio::spawn(async move { watcher.watch(&CancellationToken::new(), &payload).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.len(queues::PENDING).await.unwrap(), 0);
        assert_eq!(store.len(&queues::watched(WORKER)).await.unwrap(), 1);

        handle.await.unwrap().unwrap();
        let due = task.execute_time().unwrap() - chrono::Duration::milliseconds(50);
        assert!(Utc::now() >= due);
        assert_eq!(store.list(queues::PENDING).await.unwrap(), vec![payload]);
    }

    #[tokio::test]
    async fn test_missing_execute_time_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let payload = watched(&store, &Task::new("jobC", HashMap::new())).await;

        let watcher = DeferredTaskWatcher::new(store.clone(), WORKER);
        watcher
            .watch(&CancellationToken::new(), &payload)
            .await
            .unwrap();

        assert_eq!(store.len(&queues::watched(WORKER)).await.unwrap(), 0);
        assert_eq!(store.len(queues::PENDING).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        store.push(&queues::watched(WORKER), "garbage").await.unwrap();

        let watcher = DeferredTaskWatcher::new(store.clone(), WORKER);
        watcher
            .watch(&CancellationToken::new(), "garbage")
            .await
            .unwrap();
        assert_eq!(store.len(&queues::watched(WORKER)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_timer_leaves_task_watched() {
        let store = Arc::new(MemoryStore::new());
        let task = Task::delayed("jobC", HashMap::new(), Duration::from_secs(3600));
        let payload = watched(&store, &task).await;

        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let watcher = DeferredTaskWatcher::new(store.clone(), WORKER);
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { watcher.run(cancel, rx).await })
        };
        tx.send(payload.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(store.list(&queues::watched(WORKER)).await.unwrap(), vec![payload]);
        assert_eq!(store.len(queues::PENDING).await.unwrap(), 0);
    }
}
