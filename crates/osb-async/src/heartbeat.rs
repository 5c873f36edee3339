// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker liveness signal.
//!
//! Each worker owns a key `heartbeats:<worker-id>` that is rewritten every
//! interval with a TTL of twice the interval. When the key is gone the worker
//! is considered dead and its claimed tasks are up for recovery.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::queues;
use crate::store::QueueStore;

/// Periodically refreshes a worker's heartbeat key.
#[derive(Clone)]
pub struct Heart {
    store: Arc<dyn QueueStore>,
    key: String,
    interval: Duration,
    ttl: Duration,
}

impl Heart {
    /// Create a heart for `worker_id`. The key expires after `2 * interval`.
    pub fn new(store: Arc<dyn QueueStore>, worker_id: &str, interval: Duration) -> Self {
        Self {
            store,
            key: queues::heartbeat(worker_id),
            interval,
            ttl: interval * 2,
        }
    }

    /// Heartbeat key lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Write the heartbeat once.
    pub async fn beat(&self) -> Result<()> {
        self.store
            .set_with_ttl(&self.key, queues::HEARTBEAT_VALUE, self.ttl)
            .await?;
        debug!(key = %self.key, "Heartbeat");
        Ok(())
    }

    /// Beat immediately, then every interval until cancelled.
    ///
    /// A failed write is returned at once; a worker that cannot prove it is
    /// alive must stop claiming work.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            ttl_ms = self.ttl.as_millis() as u64,
            "Heartbeat started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Heartbeat stopping");
                    return Ok(());
                }
                _ = ticker.tick() => self.beat().await?,
            }
        }
    }
}
