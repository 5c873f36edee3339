// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OSB Async - Durable Task Engine
//!
//! An at-least-once task queue built from Redis lists, sets and expiring
//! keys. Any number of broker processes share one Redis; each runs an
//! [`Engine`] made of one worker and one cleaner.
//!
//! # Architecture
//!
//! ```text
//!                      submit_task
//!                          │
//!            ┌─────────────┴─────────────┐
//!            ▼                           ▼
//!       ┌─────────┐                ┌──────────┐
//!       │ pending │◄──────┐        │ deferred │
//!       └────┬────┘       │        └────┬─────┘
//!            │ BLMOVE     │ due         │ BLMOVE
//!            ▼            │             ▼
//!  ┌───────────────────┐  │  ┌────────────────────┐
//!  │ worker-active:<id>│  └──│ worker-watched:<id>│
//!  └─────────┬─────────┘     └────────────────────┘
//!            │ executors
//!            ▼
//!   follow-ups ──► pending / deferred      (one MULTI/EXEC with the LREM)
//! ```
//!
//! A worker proves it is alive by refreshing `heartbeats:<id>`. When that key
//! expires, any cleaner moves the worker's active tasks back to `pending` and
//! its watched tasks back to `deferred`, then forgets the worker.
//!
//! # Guarantees
//!
//! | Property | How |
//! |----------|-----|
//! | A task is in exactly one queue | every move is one atomic command or transaction |
//! | Crash recovery | heartbeat TTL + cleaner drain |
//! | Follow-ups are never lost | they are pushed in the same transaction that removes their parent |
//! | Heterogeneous workers | unknown job names are requeued with a rejection count |
//!
//! Delivery is at-least-once: a task whose worker dies mid-execution runs
//! again elsewhere, so job functions must be idempotent.
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OSB_REDIS_URL` | required | Redis connection URL |
//! | `OSB_HEARTBEAT_INTERVAL_SECS` | `30` | Heartbeat interval (TTL is twice this) |
//! | `OSB_CLEANING_INTERVAL_SECS` | `30` | Dead-worker sweep interval |
//! | `OSB_PENDING_CONCURRENCY` | `5` | Executors per worker |
//! | `OSB_RECEIVE_TIMEOUT_SECS` | `5` | Blocking move timeout |
//! | `OSB_MAX_WORKER_REJECTIONS` | unset | Park tasks in `dead-letter` past this many rejections |

#![deny(missing_docs)]

/// Dead worker recovery.
pub mod cleaner;

/// Configuration loading from environment variables.
pub mod config;

/// Engine composition and task submission.
pub mod engine;

/// Error types.
pub mod error;

/// Task execution.
pub mod executor;

/// Worker liveness.
pub mod heartbeat;

/// Job functions and registry.
pub mod job;

/// Queue and key names.
pub mod queues;

/// Claiming tasks into worker-owned queues.
pub mod receiver;

/// Queue store backends.
pub mod store;

/// Task model and wire format.
pub mod task;

/// Environment helpers for tests.
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

/// Deferred task timers.
pub mod watcher;

/// Worker composition.
pub mod worker;

pub use config::{Config, EngineConfig};
pub use engine::{Engine, EngineHandle, QueueDepths, TaskSubmitter};
pub use error::{Component, Error, Result};
pub use job::{JobError, JobFn, JobRegistry, JobResult};
pub use store::{MemoryStore, QueueStore, RedisStore};
pub use task::Task;
pub use worker::Worker;
