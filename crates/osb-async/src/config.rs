// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Tuning for a worker and its cleaner.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the worker refreshes its heartbeat key. The key lives for
    /// twice this long.
    pub heartbeat_interval: Duration,
    /// How often the cleaner looks for dead workers.
    pub cleaning_interval: Duration,
    /// Number of executors draining the pending channel.
    pub pending_concurrency: usize,
    /// How long one blocking move waits before re-checking for shutdown.
    pub receive_timeout: Duration,
    /// Rejections after which a task is parked in `dead-letter`. `None`
    /// requeues forever.
    pub max_worker_rejections: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            cleaning_interval: Duration::from_secs(30),
            pending_concurrency: 5,
            receive_timeout: Duration::from_secs(5),
            max_worker_rejections: None,
        }
    }
}

impl EngineConfig {
    /// Heartbeat key lifetime.
    pub fn heartbeat_ttl(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    /// Load engine tuning from environment variables.
    ///
    /// Optional (with defaults):
    /// - `OSB_HEARTBEAT_INTERVAL_SECS`: heartbeat interval (default: 30)
    /// - `OSB_CLEANING_INTERVAL_SECS`: dead-worker sweep interval (default: 30)
    /// - `OSB_PENDING_CONCURRENCY`: executors per worker (default: 5)
    /// - `OSB_RECEIVE_TIMEOUT_SECS`: blocking move timeout (default: 5)
    /// - `OSB_MAX_WORKER_REJECTIONS`: rejection cap (default: unset)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let heartbeat_interval = duration_secs(
            "OSB_HEARTBEAT_INTERVAL_SECS",
            defaults.heartbeat_interval,
        )?;
        let cleaning_interval =
            duration_secs("OSB_CLEANING_INTERVAL_SECS", defaults.cleaning_interval)?;
        let receive_timeout = duration_secs("OSB_RECEIVE_TIMEOUT_SECS", defaults.receive_timeout)?;

        let pending_concurrency: usize = std::env::var("OSB_PENDING_CONCURRENCY")
            .unwrap_or_else(|_| defaults.pending_concurrency.to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "OSB_PENDING_CONCURRENCY",
                "must be a positive integer",
            ))?;

        let max_worker_rejections = match std::env::var("OSB_MAX_WORKER_REJECTIONS") {
            Ok(value) => Some(value.parse().map_err(|_| {
                ConfigError::Invalid("OSB_MAX_WORKER_REJECTIONS", "must be a positive integer")
            })?),
            Err(_) => None,
        };

        Ok(Self {
            heartbeat_interval,
            cleaning_interval,
            pending_concurrency,
            receive_timeout,
            max_worker_rejections,
        })
    }
}

/// Process-level configuration for an engine backed by Redis.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,
    /// Worker and cleaner tuning
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `OSB_REDIS_URL`: Redis connection string
    ///
    /// Everything else is read by [`EngineConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let redis_url =
            std::env::var("OSB_REDIS_URL").map_err(|_| ConfigError::Missing("OSB_REDIS_URL"))?;

        Ok(Self {
            redis_url,
            engine: EngineConfig::from_env()?,
        })
    }
}

/// Read a whole number of seconds, falling back to `default` when unset.
pub fn duration_secs(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::Invalid(var, "must be a positive number of seconds")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
