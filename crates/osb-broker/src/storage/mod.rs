// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance and binding persistence.
//!
//! Both backends store each record as one JSON document. Secure details are
//! sealed with the storage's [`Codec`] and kept base64-encoded under a
//! separate field, so plaintext credentials never reach the backend.

mod memory;
mod record;
mod redis;

pub use self::memory::MemoryStorage;
pub use self::redis::RedisStorage;

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::CodecError;
use crate::model::{Binding, Instance};

/// Storage errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Redis command or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Secure details could not be sealed or opened.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Record (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored secure details are not valid base64.
    #[error("Corrupt secure details: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Persistence for instances and bindings.
///
/// Reads return owned values; callers never share state with storage.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace an instance.
    async fn write_instance(&self, instance: &Instance) -> StorageResult<()>;

    /// Load an instance by ID.
    async fn get_instance(&self, instance_id: &str) -> StorageResult<Option<Instance>>;

    /// Load an instance by alias.
    async fn get_instance_by_alias(&self, alias: &str) -> StorageResult<Option<Instance>>;

    /// Number of instances whose parent alias is `alias`.
    async fn count_children(&self, alias: &str) -> StorageResult<usize>;

    /// Delete an instance. Returns whether it existed.
    async fn delete_instance(&self, instance_id: &str) -> StorageResult<bool>;

    /// Insert or replace a binding.
    async fn write_binding(&self, binding: &Binding) -> StorageResult<()>;

    /// Load a binding by ID.
    async fn get_binding(&self, binding_id: &str) -> StorageResult<Option<Binding>>;

    /// Delete a binding. Returns whether it existed.
    async fn delete_binding(&self, binding_id: &str) -> StorageResult<bool>;
}
