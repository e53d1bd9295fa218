/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Least-recently-used queue ordering.
//!
//! [`LruQueueManager`] offers the full [`QueueManager`] contract plus
//! [`used_node`](LruQueueManager::used_node), which moves a node to the back
//! of its queue.  Because every assignment calls it, `get_nodes()` always
//! yields nodes oldest-used first: a round-robin with memory, where the node
//! that has waited longest for work from this queue is offered first.

use super::{QueueManager, QueueManagerError};

/// A [`QueueManager`] whose node order tracks assignment recency.
///
/// All reads and writes go through the wrapped manager's single lock.
#[derive(Debug, Default)]
pub struct LruQueueManager {
    inner: QueueManager,
}

impl LruQueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `source`, taking its current node order as the initial usage
    /// order.
    pub fn from_snapshot(source: &QueueManager) -> Self {
        Self {
            inner: QueueManager::from(source.snapshot()),
        }
    }

    /// Mark `node_id` as the most recently used node of `queue`.
    ///
    /// A node that is no longer in the queue (an operator removed it between
    /// selection and this call) is left out rather than re-inserted.
    ///
    /// # Errors
    /// [`QueueManagerError::UnknownQueue`] if the queue does not exist.
    pub fn used_node(&self, queue: &str, node_id: &str) -> Result<(), QueueManagerError> {
        self.inner.move_to_back(queue, node_id)
    }

    // ── Delegated QueueManager contract ──────────────────────────────────────

    pub fn add_queue(&self, name: &str) {
        self.inner.add_queue(name)
    }

    pub fn remove_queue(&self, name: &str) {
        self.inner.remove_queue(name)
    }

    pub fn add_node_to_queue(&self, node_id: &str, queue: &str) -> Result<(), QueueManagerError> {
        self.inner.add_node_to_queue(node_id, queue)
    }

    pub fn remove_node_from_queue(
        &self,
        node_id: &str,
        queue: &str,
    ) -> Result<(), QueueManagerError> {
        self.inner.remove_node_from_queue(node_id, queue)
    }

    /// Node ids of `queue`, least recently used first.
    pub fn get_nodes(&self, queue: &str) -> Result<Vec<String>, QueueManagerError> {
        self.inner.get_nodes(queue)
    }

    pub fn get_queues(&self) -> Vec<String> {
        self.inner.get_queues()
    }

    pub fn get_queues_with_node(&self, node_id: &str) -> Vec<String> {
        self.inner.get_queues_with_node(node_id)
    }

    pub fn remove_node_everywhere(&self, node_id: &str) -> Vec<String> {
        self.inner.remove_node_everywhere(node_id)
    }
}

impl From<QueueManager> for LruQueueManager {
    fn from(inner: QueueManager) -> Self {
        Self { inner }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
