// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Claims tasks from a shared queue into a worker-owned queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::store::QueueStore;

/// Moves payloads from `source` to `destination` and hands them to a
/// consumer.
///
/// The move happens before the payload is handed over, so a crash at any
/// point leaves the task in one of the two queues. Payloads claimed but not
/// yet consumed at shutdown stay in `destination` for the cleaner.
#[derive(Clone)]
pub struct TaskReceiver {
    store: Arc<dyn QueueStore>,
    source: String,
    destination: String,
    timeout: Duration,
}

impl TaskReceiver {
    /// Create a receiver. `timeout` bounds each blocking move so shutdown is
    /// noticed promptly.
    pub fn new(
        store: Arc<dyn QueueStore>,
        source: impl Into<String>,
        destination: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            source: source.into(),
            destination: destination.into(),
            timeout,
        }
    }

    /// Claim and forward payloads until cancelled or the consumer goes away.
    ///
    /// Store errors end the loop and are returned to the caller.
    pub async fn run(&self, cancel: CancellationToken, tx: mpsc::Sender<String>) -> Result<()> {
        info!(
            source = %self.source,
            destination = %self.destination,
            "Task receiver started"
        );

        loop {
            let moved = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                moved = self.store.blocking_move(&self.source, &self.destination, self.timeout) => moved?,
            };

            let Some(payload) = moved else {
                continue;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = tx.send(payload) => {
                    if sent.is_err() {
                        debug!(source = %self.source, "Task consumer closed");
                        break;
                    }
                }
            }
        }

        debug!(source = %self.source, "Task receiver stopping");
        Ok(())
    }
}
