// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Queue store abstraction.
//!
//! The engine only needs a handful of list, set and key primitives. Every
//! operation that moves a payload between lists is atomic in the store, so a
//! task is never visible in two queues at once and never in none.
//!
//! | Operation | Redis |
//! |-----------|-------|
//! | [`QueueStore::push`] | `LPUSH` |
//! | [`QueueStore::blocking_move`] | `BLMOVE src dst RIGHT LEFT timeout` |
//! | [`QueueStore::move_one`] | `LMOVE src dst RIGHT LEFT` |
//! | [`QueueStore::remove`] | `LREM queue -1 payload` |
//! | [`QueueStore::commit`] | `MULTI` / `EXEC` |
//! | [`QueueStore::set_with_ttl`] | `SET key value PX ttl` |

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Queue store errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Redis command or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One step of an atomic [`QueueStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOp {
    /// Push `payload` onto the head of `queue`.
    Push {
        /// Target list.
        queue: String,
        /// Serialized task.
        payload: String,
    },
    /// Remove the occurrence of `payload` nearest the tail of `queue`.
    Remove {
        /// Source list.
        queue: String,
        /// Serialized task.
        payload: String,
    },
}

impl QueueOp {
    /// Build a push operation.
    pub fn push(queue: impl Into<String>, payload: impl Into<String>) -> Self {
        QueueOp::Push {
            queue: queue.into(),
            payload: payload.into(),
        }
    }

    /// Build a remove operation.
    pub fn remove(queue: impl Into<String>, payload: impl Into<String>) -> Self {
        QueueOp::Remove {
            queue: queue.into(),
            payload: payload.into(),
        }
    }
}

/// Storage primitives backing the task engine.
///
/// Lists are used as FIFO queues: producers push at the head, consumers take
/// from the tail.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Push a payload onto the head of a list.
    async fn push(&self, queue: &str, payload: &str) -> StoreResult<()>;

    /// Atomically move the tail of `source` to the head of `destination`,
    /// waiting up to `timeout` for `source` to become non-empty.
    ///
    /// Returns `None` when the timeout elapses.
    async fn blocking_move(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>>;

    /// Atomically move the tail of `source` to the head of `destination`
    /// without waiting. Returns `None` when `source` is empty.
    async fn move_one(&self, source: &str, destination: &str) -> StoreResult<Option<String>>;

    /// Remove one occurrence of `payload`, searching from the tail.
    async fn remove(&self, queue: &str, payload: &str) -> StoreResult<()>;

    /// Apply all operations atomically, in order.
    async fn commit(&self, ops: &[QueueOp]) -> StoreResult<()>;

    /// All payloads in a list, head first.
    async fn list(&self, queue: &str) -> StoreResult<Vec<String>>;

    /// Number of payloads in a list.
    async fn len(&self, queue: &str) -> StoreResult<usize>;

    /// Add a member to a set.
    async fn add_member(&self, set: &str, member: &str) -> StoreResult<()>;

    /// Remove a member from a set.
    async fn remove_member(&self, set: &str, member: &str) -> StoreResult<()>;

    /// All members of a set.
    async fn members(&self, set: &str) -> StoreResult<Vec<String>>;

    /// Set a key that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Read a key. Expired and missing keys both return `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
}
