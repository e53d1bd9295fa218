/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-memory [`Monitor`] that derives load purely from the scheduler's own
//! assignments.
//!
//! Node and load maps are owned by the instance, so several monitors (and
//! therefore several schedulers) can coexist in one process and tests never
//! share state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::{Monitor, MonitorError};
use crate::node::ResourceNode;

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<String, ResourceNode>,
    load: HashMap<String, u32>,
}

/// Assignment-tracking monitor backed by two hash maps under one mutex.
#[derive(Debug, Default)]
pub struct AssignmentMonitor {
    state: Mutex<State>,
}

impl AssignmentMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor pre-populated with `nodes`, all at zero load.
    pub fn with_nodes(nodes: impl IntoIterator<Item = ResourceNode>) -> Self {
        let mut state = State::default();
        for node in nodes {
            state.load.insert(node.id.clone(), 0);
            state.nodes.insert(node.id.clone(), node);
        }
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, MonitorError> {
        self.state
            .lock()
            .map_err(|_| MonitorError::Unavailable("load map lock poisoned".to_string()))
    }

    fn not_found(node_id: &str) -> MonitorError {
        MonitorError::NodeNotFound {
            node: node_id.to_string(),
        }
    }
}

impl Monitor for AssignmentMonitor {
    fn get_node_by_id(&self, node_id: &str) -> Result<ResourceNode, MonitorError> {
        self.lock()?
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| Self::not_found(node_id))
    }

    fn get_node_by_address(&self, address: &str) -> Result<ResourceNode, MonitorError> {
        self.lock()?
            .nodes
            .values()
            .find(|node| node.address == address)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownAddress {
                address: address.to_string(),
            })
    }

    fn get_nodes(&self) -> Result<Vec<ResourceNode>, MonitorError> {
        let mut nodes: Vec<ResourceNode> = self.lock()?.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    fn get_load(&self, node: &ResourceNode) -> Result<u32, MonitorError> {
        self.lock()?
            .load
            .get(&node.id)
            .copied()
            .ok_or_else(|| Self::not_found(&node.id))
    }

    fn assign_load(&self, node: &ResourceNode, amount: u32) -> Result<(), MonitorError> {
        let mut state = self.lock()?;
        let load = state
            .load
            .get_mut(&node.id)
            .ok_or_else(|| Self::not_found(&node.id))?;
        *load = load.saturating_add(amount);
        debug!(node = %node.id, added = amount, load = *load, "load assigned");
        Ok(())
    }

    fn reduce_load(&self, node: &ResourceNode, amount: u32) -> Result<(), MonitorError> {
        let mut state = self.lock()?;
        let load = state
            .load
            .get_mut(&node.id)
            .ok_or_else(|| Self::not_found(&node.id))?;
        if amount > *load {
            warn!(
                node = %node.id,
                load = *load,
                reduce = amount,
                "reducing more load than recorded, clamping to zero"
            );
        }
        *load = load.saturating_sub(amount);
        debug!(node = %node.id, released = amount, load = *load, "load reduced");
        Ok(())
    }

    fn add_node(&self, node: ResourceNode) -> Result<(), MonitorError> {
        let mut state = self.lock()?;
        state.load.entry(node.id.clone()).or_insert(0);
        info!(node = %node.id, address = %node.address, capacity = node.capacity, "node registered");
        state.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    fn remove_node_by_id(&self, node_id: &str) -> Result<(), MonitorError> {
        let mut state = self.lock()?;
        state
            .nodes
            .remove(node_id)
            .ok_or_else(|| Self::not_found(node_id))?;
        state.load.remove(node_id);
        info!(node = %node_id, "node removed");
        Ok(())
    }

    fn set_node_capacity(&self, node_id: &str, capacity: u32) -> Result<(), MonitorError> {
        let mut state = self.lock()?;
        let node = state
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| Self::not_found(node_id))?;
        info!(node = %node_id, from = node.capacity, to = capacity, "node capacity changed");
        node.capacity = capacity;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
