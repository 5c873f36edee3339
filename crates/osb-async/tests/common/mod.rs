// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for osb-async integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use osb_async::EngineConfig;

/// Engine tuning with intervals short enough for tests.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        heartbeat_interval: Duration::from_millis(200),
        cleaning_interval: Duration::from_millis(200),
        pending_concurrency: 5,
        receive_timeout: Duration::from_millis(50),
        max_worker_rejections: None,
    }
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Install a log subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "osb_async=info".into()),
        )
        .with_test_writer()
        .try_init();
}
