// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Broker configuration loading from environment variables.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use osb_async::config::{ConfigError, duration_secs};
use tracing::warn;

use crate::codec::{AesGcmCodec, Codec, CodecError, NoopCodec};

/// Broker settings on top of the engine's.
#[derive(Clone)]
pub struct BrokerConfig {
    /// Delay between parent and children status checks.
    pub dependency_poll_interval: Duration,
    /// Raw AES-256 key for secure details. `None` stores them unencrypted.
    pub encryption_key: Option<Vec<u8>>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            dependency_poll_interval: Duration::from_secs(60),
            encryption_key: None,
        }
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("dependency_poll_interval", &self.dependency_poll_interval)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BrokerConfig {
    /// Load broker settings from environment variables.
    ///
    /// Optional (with defaults):
    /// - `OSB_DEPENDENCY_POLL_INTERVAL_SECS`: parent/children poll delay (default: 60)
    /// - `OSB_STORAGE_ENCRYPTION_KEY`: base64 32-byte key (default: unset, no encryption)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let dependency_poll_interval = duration_secs(
            "OSB_DEPENDENCY_POLL_INTERVAL_SECS",
            defaults.dependency_poll_interval,
        )?;

        let encryption_key = match std::env::var("OSB_STORAGE_ENCRYPTION_KEY") {
            Ok(key) => {
                let key = STANDARD
                    .decode(key.trim())
                    .map_err(|_| {
                        ConfigError::Invalid("OSB_STORAGE_ENCRYPTION_KEY", "must be base64")
                    })?;
                Some(key)
            }
            Err(_) => None,
        };

        Ok(Self {
            dependency_poll_interval,
            encryption_key,
        })
    }

    /// Codec for the configured key.
    pub fn codec(&self) -> Result<Arc<dyn Codec>, CodecError> {
        match &self.encryption_key {
            Some(key) => Ok(Arc::new(AesGcmCodec::new(key)?)),
            None => {
                warn!("No storage encryption key configured, secure details are stored in plaintext");
                Ok(Arc::new(NoopCodec))
            }
        }
    }
}
