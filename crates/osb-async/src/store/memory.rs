// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process queue store for tests and single-node development.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{QueueOp, QueueStore, StoreResult};

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, BTreeSet<String>>,
    keys: HashMap<String, (String, Instant)>,
}

impl State {
    fn pop_push(&mut self, source: &str, destination: &str) -> Option<String> {
        let payload = self.lists.get_mut(source)?.pop_back()?;
        self.lists
            .entry(destination.to_string())
            .or_default()
            .push_front(payload.clone());
        Some(payload)
    }

    fn remove_last(&mut self, queue: &str, payload: &str) {
        if let Some(list) = self.lists.get_mut(queue) {
            if let Some(pos) = list.iter().rposition(|p| p == payload) {
                list.remove(pos);
            }
        }
    }
}

/// Queue store held entirely in memory.
///
/// Semantics match [`RedisStore`](super::RedisStore), including blocking moves
/// and key expiry. Expiry follows the tokio clock, so paused-time tests can
/// advance past a TTL.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pushed: Notify,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, queue: &str, payload: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(queue.to_string())
            .or_default()
            .push_front(payload.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_move(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut state = self.state.lock().await;
            if let Some(payload) = state.pop_push(source, destination) {
                self.pushed.notify_waiters();
                return Ok(Some(payload));
            }

            // Register interest before releasing the lock so a concurrent push
            // cannot slip between the check and the wait.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn move_one(&self, source: &str, destination: &str) -> StoreResult<Option<String>> {
        let mut state = self.state.lock().await;
        let moved = state.pop_push(source, destination);
        if moved.is_some() {
            self.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn remove(&self, queue: &str, payload: &str) -> StoreResult<()> {
        self.state.lock().await.remove_last(queue, payload);
        Ok(())
    }

    async fn commit(&self, ops: &[QueueOp]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for op in ops {
            match op {
                QueueOp::Push { queue, payload } => state
                    .lists
                    .entry(queue.clone())
                    .or_default()
                    .push_front(payload.clone()),
                QueueOp::Remove { queue, payload } => state.remove_last(queue, payload),
            }
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn list(&self, queue: &str) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .lists
            .get(queue)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn len(&self, queue: &str) -> StoreResult<usize> {
        let state = self.state.lock().await;
        Ok(state.lists.get(queue).map_or(0, VecDeque::len))
    }

    async fn add_member(&self, set: &str, member: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn remove_member(&self, set: &str, member: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(members) = state.sets.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }

    async fn members(&self, set: &str) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state
            .keys
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let live = state
            .keys
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone());
        if live.is_none() {
            state.keys.remove(key);
        }
        Ok(live)
    }
}
