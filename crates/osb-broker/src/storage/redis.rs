// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis-backed instance and binding storage.
//!
//! Key layout:
//!
//! | Key | Type | Value |
//! |-----|------|-------|
//! | `instances:<id>` | string | instance document |
//! | `aliases:<alias>` | string | instance ID |
//! | `children:<alias>` | set | IDs of instances whose parent is `alias` |
//! | `bindings:<id>` | string | binding document |
//!
//! Instance writes and deletes touch several keys and run as Lua scripts, so
//! the stored document, its alias and the children index change together.
//! An alias key is only released by the instance it currently names.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::debug;

use super::record::{decode_binding, decode_instance, encode_binding, encode_instance};
use super::{Storage, StorageResult};
use crate::codec::Codec;
use crate::model::{Binding, Instance};

fn instance_key(instance_id: &str) -> String {
    format!("instances:{instance_id}")
}

fn alias_key(alias: &str) -> String {
    format!("aliases:{alias}")
}

fn children_key(alias: &str) -> String {
    format!("children:{alias}")
}

fn binding_key(binding_id: &str) -> String {
    format!("bindings:{binding_id}")
}

// Detaches the stored document at KEYS[1] from its alias and parent, except
// where ARGV[3] (alias) or ARGV[4] (parent alias) keep them in place. The alias
// key is only released while it still names ARGV[1]. Leaves the stored
// document in `previous`.
macro_rules! unlink_lua {
    () => {
        r#"
local previous = redis.call('GET', KEYS[1])
if previous then
    local doc = cjson.decode(previous)
    local alias = doc['alias']
    if type(alias) == 'string' and alias ~= ARGV[3] then
        local key = 'aliases:' .. alias
        if redis.call('GET', key) == ARGV[1] then
            redis.call('DEL', key)
        end
    end
    local parent = doc['parent_alias']
    if type(parent) == 'string' and parent ~= ARGV[4] then
        redis.call('SREM', 'children:' .. parent, ARGV[1])
    end
end
"#
    };
}

/// KEYS: instance, ARGV: id, document, alias, parent alias. Empty strings
/// stand for no alias.
const WRITE_INSTANCE_LUA: &str = concat!(
    unlink_lua!(),
    r#"
redis.call('SET', KEYS[1], ARGV[2])
if ARGV[3] ~= '' then
    redis.call('SET', 'aliases:' .. ARGV[3], ARGV[1])
end
if ARGV[4] ~= '' then
    redis.call('SADD', 'children:' .. ARGV[4], ARGV[1])
end
return 1
"#
);

/// KEYS: instance, ARGV: id, unused, '', ''. Returns the number of deleted
/// documents.
const DELETE_INSTANCE_LUA: &str = concat!(
    unlink_lua!(),
    r#"
return redis.call('DEL', KEYS[1])
"#
);

/// Storage backed by a Redis server.
pub struct RedisStorage {
    conn: ConnectionManager,
    codec: Arc<dyn Codec>,
    write_script: Script,
    delete_script: Script,
}

impl RedisStorage {
    /// Connect to the Redis server at `redis_url`.
    pub async fn connect(redis_url: &str, codec: Arc<dyn Codec>) -> StorageResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!("Connected instance storage to Redis");
        Ok(Self {
            conn,
            codec,
            write_script: Script::new(WRITE_INSTANCE_LUA),
            delete_script: Script::new(DELETE_INSTANCE_LUA),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn load(&self, instance_id: &str) -> StorageResult<Option<Instance>> {
        let raw: Option<String> = self.conn().get(instance_key(instance_id)).await?;
        raw.map(|raw| decode_instance(self.codec.as_ref(), &raw))
            .transpose()
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn write_instance(&self, instance: &Instance) -> StorageResult<()> {
        let raw = encode_instance(self.codec.as_ref(), instance)?;
        let _: i64 = self
            .write_script
            .key(instance_key(&instance.instance_id))
            .arg(&instance.instance_id)
            .arg(raw)
            .arg(instance.alias.as_deref().unwrap_or_default())
            .arg(instance.parent_alias.as_deref().unwrap_or_default())
            .invoke_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> StorageResult<Option<Instance>> {
        self.load(instance_id).await
    }

    async fn get_instance_by_alias(&self, alias: &str) -> StorageResult<Option<Instance>> {
        let id: Option<String> = self.conn().get(alias_key(alias)).await?;
        match id {
            Some(id) => self.load(&id).await,
            None => Ok(None),
        }
    }

    async fn count_children(&self, alias: &str) -> StorageResult<usize> {
        Ok(self.conn().scard(children_key(alias)).await?)
    }

    async fn delete_instance(&self, instance_id: &str) -> StorageResult<bool> {
        let deleted: usize = self
            .delete_script
            .key(instance_key(instance_id))
            .arg(instance_id)
            .arg("")
            .arg("")
            .arg("")
            .invoke_async(&mut self.conn())
            .await?;
        Ok(deleted > 0)
    }

    async fn write_binding(&self, binding: &Binding) -> StorageResult<()> {
        let raw = encode_binding(self.codec.as_ref(), binding)?;
        let _: () = self
            .conn()
            .set(binding_key(&binding.binding_id), raw)
            .await?;
        Ok(())
    }

    async fn get_binding(&self, binding_id: &str) -> StorageResult<Option<Binding>> {
        let raw: Option<String> = self.conn().get(binding_key(binding_id)).await?;
        raw.map(|raw| decode_binding(self.codec.as_ref(), &raw))
            .transpose()
    }

    async fn delete_binding(&self, binding_id: &str) -> StorageResult<bool> {
        let deleted: usize = self.conn().del(binding_key(binding_id)).await?;
        Ok(deleted > 0)
    }
}
