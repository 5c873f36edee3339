// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dead worker recovery.
//!
//! Every process runs a cleaner. On each sweep it walks the `workers` set and,
//! for every worker whose heartbeat key has expired, returns that worker's
//! claimed tasks to the shared queues:
//!
//! ```text
//!   worker-active:<id>   ──LMOVE──►  pending
//!   worker-watched:<id>  ──LMOVE──►  deferred
//!   SREM workers <id>
//! ```
//!
//! Each move is atomic, so a cleaner that dies mid-sweep leaves every task in
//! exactly one queue and the next sweep picks up where it stopped. Several
//! cleaners sweeping the same dead worker only race on individual moves.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::queues;
use crate::store::QueueStore;

/// Periodically requeues tasks owned by dead workers.
#[derive(Clone)]
pub struct Cleaner {
    store: Arc<dyn QueueStore>,
    interval: Duration,
}

impl Cleaner {
    /// Create a cleaner sweeping every `interval`.
    pub fn new(store: Arc<dyn QueueStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Sweep every interval until cancelled. A store error ends the loop.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            "Cleaner started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Cleaner stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.clean(&cancel).await {
                        error!(error = %e, "Cleaner sweep failed");
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Run one sweep. Returns how many tasks were returned to shared queues.
    pub async fn clean(&self, cancel: &CancellationToken) -> Result<usize> {
        let workers = self.store.members(queues::WORKERS).await?;
        let mut recovered = 0;

        for worker_id in workers {
            if cancel.is_cancelled() {
                break;
            }
            if self
                .store
                .get(&queues::heartbeat(&worker_id))
                .await?
                .is_some()
            {
                continue;
            }

            let active = self
                .drain(cancel, &queues::active(&worker_id), queues::PENDING)
                .await?;
            let watched = self
                .drain(cancel, &queues::watched(&worker_id), queues::DEFERRED)
                .await?;
            if cancel.is_cancelled() {
                // Leave the worker registered so the next sweep finishes it.
                break;
            }
            self.store
                .remove_member(queues::WORKERS, &worker_id)
                .await?;

            warn!(
                worker_id = %worker_id,
                active_tasks = active,
                watched_tasks = watched,
                "Recovered tasks from dead worker"
            );
            recovered += active + watched;
        }

        Ok(recovered)
    }

    async fn drain(
        &self,
        cancel: &CancellationToken,
        source: &str,
        destination: &str,
    ) -> Result<usize> {
        let mut moved = 0;
        while !cancel.is_cancelled() {
            match self.store.move_one(source, destination).await? {
                Some(_) => moved += 1,
                None => break,
            }
        }
        Ok(moved)
    }
}
