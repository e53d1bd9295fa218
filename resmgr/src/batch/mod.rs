/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Job dispatch.
//!
//! A [`BatchManager`] takes a job the scheduler has placed and starts it on
//! the chosen node.  `execute_remotely` only reports whether the *hand-off*
//! worked; how the job itself ends is recorded later as a job status.

pub mod local;

pub use local::LocalBatchManager;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::JobSpec;
use crate::node::ResourceNode;

/// Dispatch to a node failed after the node was selected and its load
/// reserved.  The scheduler rolls the reservation back and requeues the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobExecutionError {
    #[error("node '{node}' is down, unable to execute job")]
    NodeUnavailable { node: String },

    #[error("no job implementation registered for type '{job_type}'")]
    UnknownJobType { job_type: String },

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

#[async_trait]
pub trait BatchManager: Send + Sync {
    /// Hand `spec` off to `node`.
    async fn execute_remotely(
        &self,
        spec: &JobSpec,
        node: &ResourceNode,
    ) -> Result<(), JobExecutionError>;

    /// Node currently running `job_id`, if any.
    fn execution_node(&self, job_id: &str) -> Option<String>;

    /// Stop a running job.  Returns `false` if the job is not running.
    fn kill_job(&self, job_id: &str, node: &ResourceNode) -> bool;

    /// Ids of the jobs running on `node_id`, sorted.
    fn jobs_on_node(&self, node_id: &str) -> Vec<String>;

    /// Stop releasing load for the jobs still running on `node_id`.
    ///
    /// Called when the node is removed: its load record is gone, and a node
    /// later registered under the same id must not lose load it never
    /// received.  The jobs keep running.  Returns their ids, sorted.
    fn detach_node(&self, node_id: &str) -> Vec<String>;
}
