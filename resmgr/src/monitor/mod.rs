/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node registry and load accounting.
//!
//! The [`Monitor`] trait is the scheduler's only view of how busy a node is.
//! Capacity checking is **not** the monitor's job: the scheduler decides
//! whether a job fits before calling [`Monitor::assign_load`], and a monitor
//! only fails when its backing data source does.

pub mod assignment;

pub use assignment::AssignmentMonitor;

use thiserror::Error;

use crate::node::ResourceNode;

// ── Error type ────────────────────────────────────────────────────────────────

/// Infrastructure failure while reading or writing node identity or load.
///
/// Fatal for the scheduling attempt that hit it; the scheduler does not skip
/// a node whose monitor query failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("node '{node}' is not known to the monitor")]
    NodeNotFound { node: String },

    #[error("no node is registered at address '{address}'")]
    UnknownAddress { address: String },

    #[error("monitor backend unavailable: {0}")]
    Unavailable(String),
}

// ── Monitor trait ─────────────────────────────────────────────────────────────

/// Authoritative source of node identity and current per-node load.
pub trait Monitor: Send + Sync {
    /// Resolve a node by identifier.
    fn get_node_by_id(&self, node_id: &str) -> Result<ResourceNode, MonitorError>;

    /// Resolve a node by its execution endpoint address.
    fn get_node_by_address(&self, address: &str) -> Result<ResourceNode, MonitorError>;

    /// All registered nodes.
    fn get_nodes(&self) -> Result<Vec<ResourceNode>, MonitorError>;

    /// Capacity units currently consumed on `node`.
    fn get_load(&self, node: &ResourceNode) -> Result<u32, MonitorError>;

    /// Record `amount` more units of load on `node`.
    fn assign_load(&self, node: &ResourceNode, amount: u32) -> Result<(), MonitorError>;

    /// Release `amount` units of load on `node`, never going below zero.
    fn reduce_load(&self, node: &ResourceNode, amount: u32) -> Result<(), MonitorError>;

    /// Register `node`, replacing an existing node with the same id.
    fn add_node(&self, node: ResourceNode) -> Result<(), MonitorError>;

    /// Forget a node and its load.
    fn remove_node_by_id(&self, node_id: &str) -> Result<(), MonitorError>;

    /// Change a node's static capacity.
    fn set_node_capacity(&self, node_id: &str, capacity: u32) -> Result<(), MonitorError>;
}
