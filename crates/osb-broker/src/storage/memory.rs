// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process storage for tests and single-node development.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::record::{decode_binding, decode_instance, encode_binding, encode_instance};
use super::{Storage, StorageResult};
use crate::codec::{Codec, NoopCodec};
use crate::model::{Binding, Instance};

#[derive(Default)]
struct State {
    instances: HashMap<String, String>,
    aliases: HashMap<String, String>,
    children: HashMap<String, HashSet<String>>,
    bindings: HashMap<String, String>,
}

impl State {
    /// Drop the alias and parent-index entries of a stored instance.
    fn unlink(&mut self, instance: &Instance) {
        if let Some(alias) = &instance.alias {
            if self.aliases.get(alias) == Some(&instance.instance_id) {
                self.aliases.remove(alias);
            }
        }
        if let Some(parent) = &instance.parent_alias {
            if let Some(children) = self.children.get_mut(parent) {
                children.remove(&instance.instance_id);
                if children.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
    }
}

/// Storage backed by process memory.
///
/// Records go through the same encoding as [`super::RedisStorage`], so codec
/// behavior is exercised without a server.
pub struct MemoryStorage {
    codec: Arc<dyn Codec>,
    state: Mutex<State>,
}

impl MemoryStorage {
    /// Create empty storage that seals secure details with `codec`.
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(Arc::new(NoopCodec))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write_instance(&self, instance: &Instance) -> StorageResult<()> {
        let raw = encode_instance(self.codec.as_ref(), instance)?;
        let mut state = self.state.lock().await;

        if let Some(previous) = state.instances.get(&instance.instance_id) {
            let previous = decode_instance(self.codec.as_ref(), previous)?;
            state.unlink(&previous);
        }
        if let Some(alias) = &instance.alias {
            state
                .aliases
                .insert(alias.clone(), instance.instance_id.clone());
        }
        if let Some(parent) = &instance.parent_alias {
            state
                .children
                .entry(parent.clone())
                .or_default()
                .insert(instance.instance_id.clone());
        }
        state.instances.insert(instance.instance_id.clone(), raw);
        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> StorageResult<Option<Instance>> {
        let state = self.state.lock().await;
        state
            .instances
            .get(instance_id)
            .map(|raw| decode_instance(self.codec.as_ref(), raw))
            .transpose()
    }

    async fn get_instance_by_alias(&self, alias: &str) -> StorageResult<Option<Instance>> {
        let state = self.state.lock().await;
        state
            .aliases
            .get(alias)
            .and_then(|id| state.instances.get(id))
            .map(|raw| decode_instance(self.codec.as_ref(), raw))
            .transpose()
    }

    async fn count_children(&self, alias: &str) -> StorageResult<usize> {
        let state = self.state.lock().await;
        Ok(state.children.get(alias).map_or(0, HashSet::len))
    }

    async fn delete_instance(&self, instance_id: &str) -> StorageResult<bool> {
        let mut state = self.state.lock().await;
        let Some(raw) = state.instances.remove(instance_id) else {
            return Ok(false);
        };
        let instance = decode_instance(self.codec.as_ref(), &raw)?;
        state.unlink(&instance);
        Ok(true)
    }

    async fn write_binding(&self, binding: &Binding) -> StorageResult<()> {
        let raw = encode_binding(self.codec.as_ref(), binding)?;
        self.state
            .lock()
            .await
            .bindings
            .insert(binding.binding_id.clone(), raw);
        Ok(())
    }

    async fn get_binding(&self, binding_id: &str) -> StorageResult<Option<Binding>> {
        let state = self.state.lock().await;
        state
            .bindings
            .get(binding_id)
            .map(|raw| decode_binding(self.codec.as_ref(), raw))
            .transpose()
    }

    async fn delete_binding(&self, binding_id: &str) -> StorageResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .bindings
            .remove(binding_id)
            .is_some())
    }
}
