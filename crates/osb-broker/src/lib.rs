// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OSB Broker - Step-Chain Provisioning
//!
//! Runs the asynchronous side of an Open Service Broker on top of
//! [`osb_async`]. Service modules describe provisioning, updating and
//! deprovisioning as chains of named steps; the broker runs one step per
//! task, so a run survives worker crashes and resumes at the step that was
//! in flight.
//!
//! # Lifecycle
//!
//! ```text
//!  provision ──► provisioning_deferred ──(parent ready)──┐
//!      │                                                 ▼
//!      └──────────────────────────────────────────► provisioning ──► provisioned
//!                                                        │                │
//!                                                        ▼             update
//!                                               provisioning_failed       ▼
//!                                                                     updating ──► updated
//!                                                                         │
//!                                                                         ▼
//!                                                                  updating_failed
//!
//!  deprovision ──(no children left)──► deprovisioning ──► deleted
//!                                            │
//!                                            ▼
//!                                   deprovisioning_failed
//! ```
//!
//! A step receives its own copy of the instance (with the parent loaded when
//! it has one) and returns [`service::StepOutput`]; only those details are
//! merged back, so a step cannot corrupt the broker's bookkeeping.
//!
//! # Configuration
//!
//! Engine variables are documented in [`osb_async`]. In addition:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OSB_DEPENDENCY_POLL_INTERVAL_SECS` | `60` | Delay between parent/children checks |
//! | `OSB_STORAGE_ENCRYPTION_KEY` | unset | Base64 AES-256 key for secure details |

#![deny(missing_docs)]

/// Provision, update and deprovision entry points.
pub mod broker;

/// Encryption of secure details at rest.
pub mod codec;

/// Configuration loading from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// Step-chain jobs.
pub mod jobs;

/// Instances and bindings.
pub mod model;

/// Embeddable runtime.
pub mod runtime;

/// Service catalog and step chains.
pub mod service;

/// Instance and binding storage.
pub mod storage;

pub use broker::Broker;
pub use codec::{AesGcmCodec, Codec, NoopCodec};
pub use config::BrokerConfig;
pub use error::{Error, Result};
pub use jobs::{Jobs, Phase};
pub use model::{Binding, BindingStatus, Instance, InstanceStatus};
pub use runtime::{BrokerRuntime, BrokerRuntimeBuilder};
pub use service::{Catalog, Plan, Service, ServiceManager, Step, StepChain, StepError, StepOutput};
pub use storage::{MemoryStorage, RedisStorage, Storage};
