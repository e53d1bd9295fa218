/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Compute node identity.
//!
//! A [`ResourceNode`] only carries what never changes while a job runs: its
//! identifier, where to reach it, and its total capacity.  How much of that
//! capacity is currently consumed is owned by the
//! [`Monitor`](crate::monitor::Monitor), so the monitor backend can be swapped
//! without touching node identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A compute target that jobs can be dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Unique node identifier (also the key used by queues).
    pub id: String,

    /// Network address of the node's execution endpoint.
    pub address: String,

    /// Static ceiling on the sum of `load_value`s the node may run at once.
    pub capacity: u32,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, address: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            capacity,
        }
    }

    /// Capacity left over once `current_load` is subtracted.
    ///
    /// Saturates at zero: a node whose monitor reports more load than its
    /// capacity (e.g. after the capacity was lowered) simply has no room.
    pub fn headroom(&self, current_load: u32) -> u32 {
        self.capacity.saturating_sub(current_load)
    }

    /// Returns `true` if a job costing `load_value` fits next to
    /// `current_load`.
    pub fn admits(&self, load_value: u32, current_load: u32) -> bool {
        load_value <= self.headroom(current_load)
    }
}

impl fmt::Display for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, capacity {})", self.id, self.address, self.capacity)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
