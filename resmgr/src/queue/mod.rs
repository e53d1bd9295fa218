/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Queue → node membership.
//!
//! A queue is a name plus an ordered, duplicate-free list of node ids that may
//! serve jobs submitted to it.  A node can belong to any number of queues.
//!
//! [`QueueManager`] holds all queues behind a single mutex: the node ordering
//! is part of the scheduling decision (see [`LruQueueManager`]) and must never
//! be observed half-way through a mutation.

pub mod lru;

pub use lru::LruQueueManager;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

// ── Error type ────────────────────────────────────────────────────────────────

/// Failure of a queue operation.  Always a caller or configuration bug; the
/// scheduler never retries these automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueManagerError {
    #[error("queue '{queue}' does not exist")]
    UnknownQueue { queue: String },
}

/// Ordered node-id lists keyed by queue name.
///
/// `BTreeMap` so `get_queues()` is alphabetical and deterministic.
type QueueMap = BTreeMap<String, Vec<String>>;

// ── QueueManager ──────────────────────────────────────────────────────────────

/// Thread-safe registry of queues and their member nodes.
#[derive(Debug, Default)]
pub struct QueueManager {
    queues: Mutex<QueueMap>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manager from `(queue, nodes)` pairs, keeping each node list in
    /// the given order and dropping duplicates.
    pub fn from_queues<I, Q, N>(queues: I) -> Self
    where
        I: IntoIterator<Item = (Q, Vec<N>)>,
        Q: Into<String>,
        N: Into<String>,
    {
        let mgr = Self::new();
        {
            let mut map = mgr.lock();
            for (name, nodes) in queues {
                let entry = map.entry(name.into()).or_default();
                for node in nodes {
                    let node = node.into();
                    if !entry.contains(&node) {
                        entry.push(node);
                    }
                }
            }
        }
        mgr
    }

    /// Create an empty queue.  Does nothing if `name` already exists.
    pub fn add_queue(&self, name: &str) {
        let mut map = self.lock();
        if !map.contains_key(name) {
            map.insert(name.to_string(), Vec::new());
            info!(queue = %name, "queue added");
        }
    }

    /// Remove a queue.  Does nothing if `name` is unknown.
    pub fn remove_queue(&self, name: &str) {
        if self.lock().remove(name).is_some() {
            info!(queue = %name, "queue removed");
        }
    }

    /// Append `node_id` to `queue` unless it is already a member.
    ///
    /// # Errors
    /// [`QueueManagerError::UnknownQueue`] if the queue does not exist.
    pub fn add_node_to_queue(&self, node_id: &str, queue: &str) -> Result<(), QueueManagerError> {
        let mut map = self.lock();
        let nodes = Self::queue_mut(&mut map, queue)?;
        if !nodes.iter().any(|n| n == node_id) {
            nodes.push(node_id.to_string());
            info!(queue = %queue, node = %node_id, "node added to queue");
        }
        Ok(())
    }

    /// Remove `node_id` from `queue`; a no-op if it is not a member.
    ///
    /// # Errors
    /// [`QueueManagerError::UnknownQueue`] if the queue does not exist.
    pub fn remove_node_from_queue(
        &self,
        node_id: &str,
        queue: &str,
    ) -> Result<(), QueueManagerError> {
        let mut map = self.lock();
        let nodes = Self::queue_mut(&mut map, queue)?;
        if let Some(pos) = nodes.iter().position(|n| n == node_id) {
            nodes.remove(pos);
            info!(queue = %queue, node = %node_id, "node removed from queue");
        }
        Ok(())
    }

    /// Snapshot of the node ids in `queue`, in order.
    ///
    /// # Errors
    /// [`QueueManagerError::UnknownQueue`] if the queue does not exist.
    pub fn get_nodes(&self, queue: &str) -> Result<Vec<String>, QueueManagerError> {
        self.lock()
            .get(queue)
            .cloned()
            .ok_or_else(|| QueueManagerError::UnknownQueue {
                queue: queue.to_string(),
            })
    }

    /// Names of all queues, alphabetically.
    pub fn get_queues(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Names of every queue that contains `node_id`.
    pub fn get_queues_with_node(&self, node_id: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, nodes)| nodes.iter().any(|n| n == node_id))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Drop `node_id` from every queue.  Returns the queues it was removed
    /// from.
    pub fn remove_node_everywhere(&self, node_id: &str) -> Vec<String> {
        let mut removed = Vec::new();
        for (name, nodes) in self.lock().iter_mut() {
            if let Some(pos) = nodes.iter().position(|n| n == node_id) {
                nodes.remove(pos);
                removed.push(name.clone());
            }
        }
        debug!(node = %node_id, queues = ?removed, "node removed from all queues");
        removed
    }

    /// Move `node_id` to the back of `queue`.  A no-op if the node is not in
    /// the queue.
    pub(crate) fn move_to_back(&self, queue: &str, node_id: &str) -> Result<(), QueueManagerError> {
        let mut map = self.lock();
        let nodes = Self::queue_mut(&mut map, queue)?;
        if let Some(pos) = nodes.iter().position(|n| n == node_id) {
            let node = nodes.remove(pos);
            nodes.push(node);
        }
        Ok(())
    }

    /// Copy of the full queue map, preserving every ordering.
    pub(crate) fn snapshot(&self) -> QueueMap {
        self.lock().clone()
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// A panic while holding the lock cannot leave a node list half-edited
    /// (every mutation is a single `Vec` call), so a poisoned lock is safe to
    /// keep using.
    fn lock(&self) -> MutexGuard<'_, QueueMap> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue_mut<'a>(
        map: &'a mut QueueMap,
        queue: &str,
    ) -> Result<&'a mut Vec<String>, QueueManagerError> {
        map.get_mut(queue)
            .ok_or_else(|| QueueManagerError::UnknownQueue {
                queue: queue.to_string(),
            })
    }
}

impl From<QueueMap> for QueueManager {
    fn from(map: QueueMap) -> Self {
        Self {
            queues: Mutex::new(map),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
