// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Broker error types.

use thiserror::Error;

use crate::codec::CodecError;
use crate::model::InstanceStatus;
use crate::service::ServiceError;
use crate::storage::StorageError;

/// Broker errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Instance or binding storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The task engine failed.
    #[error("Engine error: {0}")]
    Engine(#[from] osb_async::Error),

    /// Catalog lookup or chain construction failed.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// No instance with this ID exists.
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// The instance cannot take this operation in its current state.
    #[error("Instance {instance_id} is {status}; cannot {operation}")]
    InvalidState {
        /// Instance ID.
        instance_id: String,
        /// Current status.
        status: InstanceStatus,
        /// Operation that was refused.
        operation: &'static str,
    },

    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Broker configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] osb_async::config::ConfigError),

    /// The storage encryption key is unusable.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, Error>;
