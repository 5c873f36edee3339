// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Queue and key names shared by every process using the same Redis.

/// Tasks ready to run on any worker.
pub const PENDING: &str = "pending";

/// Tasks waiting for their execute time.
pub const DEFERRED: &str = "deferred";

/// Tasks rejected more often than the configured cap allows.
pub const DEAD_LETTER: &str = "dead-letter";

/// Set of registered worker IDs.
pub const WORKERS: &str = "workers";

/// Value written to heartbeat keys.
pub const HEARTBEAT_VALUE: &str = "alive";

/// Tasks claimed by a worker and being executed.
pub fn active(worker_id: &str) -> String {
    format!("worker-active:{worker_id}")
}

/// Deferred tasks claimed by a worker and waiting on a timer.
pub fn watched(worker_id: &str) -> String {
    format!("worker-watched:{worker_id}")
}

/// Liveness key for a worker.
pub fn heartbeat(worker_id: &str) -> String {
    format!("heartbeats:{worker_id}")
}
