// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis-backed queue store.
//!
//! Regular commands share one [`ConnectionManager`], which reconnects on its
//! own. Blocking moves hold their connection for up to the receive timeout,
//! which would stall every other command pipelined behind them, so each
//! in-flight `BLMOVE` borrows a dedicated multiplexed connection from a small
//! idle pool instead.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::debug;

use super::{QueueOp, QueueStore, StoreError, StoreResult};

/// Redis treats a zero `BLMOVE` timeout as "wait forever".
const MIN_BLOCKING_TIMEOUT: Duration = Duration::from_millis(10);

/// Queue store backed by a Redis server.
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    blocking: Mutex<Vec<MultiplexedConnection>>,
}

impl RedisStore {
    /// Connect to the Redis server at `redis_url`.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        debug!("Connected queue store to Redis");
        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(Vec::new()),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn checkout_blocking(&self) -> StoreResult<MultiplexedConnection> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn checkin_blocking(&self, conn: MultiplexedConnection) {
        self.blocking.lock().await.push(conn);
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn push(&self, queue: &str, payload: &str) -> StoreResult<()> {
        let _: () = self.conn().lpush(queue, payload).await?;
        Ok(())
    }

    async fn blocking_move(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let mut conn = self.checkout_blocking().await?;
        let moved: Option<String> = redis::cmd("BLMOVE")
            .arg(source)
            .arg(destination)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.max(MIN_BLOCKING_TIMEOUT).as_secs_f64())
            .query_async(&mut conn)
            .await?;
        // Connections that errored are dropped rather than returned.
        self.checkin_blocking(conn).await;
        Ok(moved)
    }

    async fn move_one(&self, source: &str, destination: &str) -> StoreResult<Option<String>> {
        let moved: Option<String> = redis::cmd("LMOVE")
            .arg(source)
            .arg(destination)
            .arg("RIGHT")
            .arg("LEFT")
            .query_async(&mut self.conn())
            .await?;
        Ok(moved)
    }

    async fn remove(&self, queue: &str, payload: &str) -> StoreResult<()> {
        let _: i64 = self.conn().lrem(queue, -1, payload).await?;
        Ok(())
    }

    async fn commit(&self, ops: &[QueueOp]) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                QueueOp::Push { queue, payload } => {
                    pipe.lpush(queue, payload).ignore();
                }
                QueueOp::Remove { queue, payload } => {
                    pipe.lrem(queue, -1, payload).ignore();
                }
            }
        }
        let _: () = pipe.query_async(&mut self.conn()).await?;
        Ok(())
    }

    async fn list(&self, queue: &str) -> StoreResult<Vec<String>> {
        Ok(self.conn().lrange(queue, 0, -1).await?)
    }

    async fn len(&self, queue: &str) -> StoreResult<usize> {
        Ok(self.conn().llen(queue).await?)
    }

    async fn add_member(&self, set: &str, member: &str) -> StoreResult<()> {
        let _: i64 = self.conn().sadd(set, member).await?;
        Ok(())
    }

    async fn remove_member(&self, set: &str, member: &str) -> StoreResult<()> {
        let _: i64 = self.conn().srem(set, member).await?;
        Ok(())
    }

    async fn members(&self, set: &str) -> StoreResult<Vec<String>> {
        Ok(self.conn().smembers(set).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let millis = u64::try_from(ttl.as_millis())
            .map_err(|_| StoreError::Other(format!("TTL too large for key '{key}'")))?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis.max(1))
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.conn().get(key).await?)
    }
}
