// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helpers for tests that change process environment variables.

use std::env;
use std::sync::{Mutex, MutexGuard, PoisonError};

// Serializes every guarded test in the process.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Sets and removes environment variables, restoring the previous values
/// on drop. Holds a process-wide lock while alive, so two guarded tests
/// never see each other's variables.
pub struct EnvGuard {
    vars: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Take the lock and unset every variable in `keys`.
    pub fn clean(keys: &[&str]) -> Self {
        let mut guard = Self {
            vars: Vec::new(),
            _lock: ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner),
        };
        for key in keys {
            guard.remove(key);
        }
        guard
    }

    /// Set `key` to `value` until the guard drops.
    pub fn set(&mut self, key: &str, value: &str) {
        let old = env::var(key).ok();
        self.vars.push((key.to_string(), old));
        // SAFETY: ENV_MUTEX is held, so no other guarded test touches the environment.
        unsafe { env::set_var(key, value) };
    }

    /// Unset `key` until the guard drops.
    pub fn remove(&mut self, key: &str) {
        let old = env::var(key).ok();
        self.vars.push((key.to_string(), old));
        // SAFETY: ENV_MUTEX is held, so no other guarded test touches the environment.
        unsafe { env::remove_var(key) };
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.vars.drain(..).rev() {
            // SAFETY: ENV_MUTEX is still held; `_lock` is released after this runs.
            unsafe {
                match value {
                    Some(v) => env::set_var(&key, v),
                    None => env::remove_var(&key),
                }
            }
        }
    }
}
