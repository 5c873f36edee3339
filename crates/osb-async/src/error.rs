// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the task engine.

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Engine subsystem that stopped a worker or engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Heartbeat loop.
    Heartbeat,
    /// Receiver moving `pending` into the active queue.
    PendingReceiver,
    /// Task executor pool.
    Executor,
    /// Receiver moving `deferred` into the watched queue.
    DeferredReceiver,
    /// Deferred task watcher.
    Watcher,
    /// Dead-worker cleaner.
    Cleaner,
    /// Worker as a whole (only reported by the engine).
    Worker,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Heartbeat => "heartbeat",
            Component::PendingReceiver => "pending task receiver",
            Component::Executor => "task executor",
            Component::DeferredReceiver => "deferred task receiver",
            Component::Watcher => "deferred task watcher",
            Component::Cleaner => "cleaner",
            Component::Worker => "worker",
        };
        f.write_str(name)
    }
}

/// Engine error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Queue store failure.
    #[error("Queue store error: {0}")]
    Store(#[from] StoreError),

    /// Task (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A job function was registered twice under the same name.
    #[error("a job function named '{0}' is already registered")]
    DuplicateJob(String),

    /// A job reported a failure the process cannot continue past.
    #[error("job '{job_name}' failed fatally: {message}")]
    FatalJob {
        /// Name of the job that failed.
        job_name: String,
        /// Failure description returned by the job.
        message: String,
    },

    /// A subsystem stopped with an error and brought its siblings down.
    #[error("{component} stopped: {source}")]
    Stopped {
        /// Subsystem that failed first.
        component: Component,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A subsystem task panicked.
    #[error("{component} panicked: {message}")]
    Panicked {
        /// Subsystem whose task panicked.
        component: Component,
        /// Panic payload, if it was a string.
        message: String,
    },
}

impl Error {
    /// Wrap this error as the reason `component` stopped.
    pub fn stopped(self, component: Component) -> Self {
        Error::Stopped {
            component,
            source: Box::new(self),
        }
    }

    /// Subsystem that stopped, if this error came from a worker or engine run.
    pub fn component(&self) -> Option<Component> {
        match self {
            Error::Stopped { component, .. } | Error::Panicked { component, .. } => {
                Some(*component)
            }
            _ => None,
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
