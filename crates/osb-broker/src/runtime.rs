// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable broker runtime.
//!
//! [`BrokerRuntime`] wires a task engine, instance storage and a service
//! catalog together, registers the step-chain jobs and runs the engine in
//! the background of an existing tokio application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use osb_broker::runtime::BrokerRuntime;
//! use osb_broker::service::{Catalog, Plan, Service};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut catalog = Catalog::new();
//!     catalog.add_service(
//!         Service::new("postgres", "PostgreSQL", Arc::new(PostgresManager::new()))
//!             .with_plan(Plan::new("small", "Small")),
//!     )?;
//!
//!     let runtime = BrokerRuntime::from_env(catalog).await?.start().await?;
//!
//!     let broker = runtime.broker();
//!     // ... serve the platform API with `broker` ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use osb_async::{Config, Engine, EngineConfig, EngineHandle, QueueStore, RedisStore};
use tracing::{error, info};

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::jobs::Jobs;
use crate::service::Catalog;
use crate::storage::{RedisStorage, Storage};

/// Builder for a [`BrokerRuntime`].
pub struct BrokerRuntimeBuilder {
    store: Option<Arc<dyn QueueStore>>,
    storage: Option<Arc<dyn Storage>>,
    catalog: Catalog,
    engine_config: EngineConfig,
    broker_config: BrokerConfig,
}

impl Default for BrokerRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            storage: None,
            catalog: Catalog::new(),
            engine_config: EngineConfig::default(),
            broker_config: BrokerConfig::default(),
        }
    }
}

impl BrokerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue store the engine runs on (required).
    pub fn store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set instance storage (required).
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the service catalog.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Set engine tuning.
    ///
    /// Default: [`EngineConfig::default`]
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Set broker settings.
    ///
    /// Default: [`BrokerConfig::default`]
    pub fn broker_config(mut self, config: BrokerConfig) -> Self {
        self.broker_config = config;
        self
    }

    /// Validate the configuration.
    pub fn build(self) -> Result<BrokerRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let storage = self
            .storage
            .ok_or_else(|| anyhow::anyhow!("storage is required"))?;
        if self.engine_config.pending_concurrency == 0 {
            anyhow::bail!("pending_concurrency must be at least 1");
        }

        Ok(BrokerRuntimeConfig {
            store,
            storage,
            catalog: Arc::new(self.catalog),
            engine_config: self.engine_config,
            broker_config: self.broker_config,
        })
    }
}

/// Validated configuration for a [`BrokerRuntime`].
pub struct BrokerRuntimeConfig {
    store: Arc<dyn QueueStore>,
    storage: Arc<dyn Storage>,
    catalog: Arc<Catalog>,
    engine_config: EngineConfig,
    broker_config: BrokerConfig,
}

impl BrokerRuntimeConfig {
    /// Register the broker jobs and start the engine.
    pub async fn start(self) -> Result<BrokerRuntime> {
        info!(
            services = ?self.catalog.service_ids(),
            pending_concurrency = self.engine_config.pending_concurrency,
            heartbeat_interval = ?self.engine_config.heartbeat_interval,
            dependency_poll_interval = ?self.broker_config.dependency_poll_interval,
            "Starting broker runtime"
        );

        let engine = Engine::new(self.store, self.engine_config);
        let jobs = Jobs::new(
            self.storage,
            self.catalog,
            self.broker_config.dependency_poll_interval,
        );
        jobs.register(&engine)
            .await
            .context("failed to register broker jobs")?;

        let handle = engine.start();
        let broker = Broker::new(jobs, handle.submitter().clone());

        info!(worker_id = %engine.worker_id(), "Broker runtime started");
        Ok(BrokerRuntime {
            engine,
            handle,
            broker,
        })
    }
}

/// A running broker.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct BrokerRuntime {
    engine: Engine,
    handle: EngineHandle,
    broker: Broker,
}

impl BrokerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> BrokerRuntimeBuilder {
        BrokerRuntimeBuilder::new()
    }

    /// Connect to Redis using environment configuration.
    ///
    /// Reads [`Config::from_env`] and [`BrokerConfig::from_env`]; queues and
    /// instances share the server at `OSB_REDIS_URL`.
    pub async fn from_env(catalog: Catalog) -> Result<BrokerRuntimeConfig> {
        let config = Config::from_env().context("invalid engine configuration")?;
        let broker_config = BrokerConfig::from_env().context("invalid broker configuration")?;
        let codec = broker_config
            .codec()
            .context("invalid storage encryption key")?;

        let store = RedisStore::connect(&config.redis_url)
            .await
            .context("failed to connect queue store")?;
        let storage = RedisStorage::connect(&config.redis_url, codec)
            .await
            .context("failed to connect instance storage")?;

        Self::builder()
            .store(Arc::new(store))
            .storage(Arc::new(storage))
            .catalog(catalog)
            .engine_config(config.engine)
            .broker_config(broker_config)
            .build()
    }

    /// Broker operations.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// The underlying engine, e.g. for [`Engine::queue_depths`].
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Whether the engine stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the engine and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("Broker runtime shutting down...");
        match self.handle.shutdown().await {
            Ok(()) => {
                info!("Broker runtime shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Broker runtime stopped with an error");
                Err(e.into())
            }
        }
    }
}
