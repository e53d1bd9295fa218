/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for the LRU scheduler.
//!
//! [`SchedulerError`] is what [`LruScheduler::schedule()`] and
//! [`LruScheduler::node_available()`] return to the main loop.  It wraps the
//! component error that aborted the attempt so the loop can log *which*
//! collaborator failed without parsing strings:
//!
//! | Variant | Raised when | Loop reaction |
//! |---|---|---|
//! | `QueueManager` | the job names a queue that does not exist | log, requeue |
//! | `Monitor` | node lookup, load lookup or load reservation failed | log, requeue |
//! | `InsufficientCapacity` | a direct dispatch names a node without room | returned to the caller |
//! | `JobExecution` | the batch manager refused a direct dispatch | returned to the caller |
//!
//! Dispatch failures inside `schedule()` are *not* surfaced as errors: they
//! are rolled back in place and reported as
//! [`ScheduleOutcome::DispatchFailed`](super::ScheduleOutcome::DispatchFailed).
//! Only [`LruScheduler::dispatch_to()`], where the caller picked the node,
//! returns them.
//!
//! [`LruScheduler::schedule()`]: super::LruScheduler::schedule
//! [`LruScheduler::node_available()`]: super::LruScheduler::node_available
//! [`LruScheduler::dispatch_to()`]: super::LruScheduler::dispatch_to

use thiserror::Error;

use crate::batch::JobExecutionError;
use crate::monitor::MonitorError;
use crate::queue::QueueManagerError;

/// Failure of a single scheduling attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("queue lookup failed: {0}")]
    QueueManager(#[from] QueueManagerError),

    #[error("monitor failure: {0}")]
    Monitor(#[from] MonitorError),

    #[error("node '{node}' has {available} free units, job needs {requested}")]
    InsufficientCapacity {
        node: String,
        requested: u32,
        available: u32,
    },

    #[error("job execution failed: {0}")]
    JobExecution(#[from] JobExecutionError),
}

impl SchedulerError {
    /// Short, stable label for the failing collaborator; used as a log field.
    pub fn source_kind(&self) -> &'static str {
        match self {
            SchedulerError::QueueManager(_) => "queue_manager",
            SchedulerError::Monitor(_) => "monitor",
            SchedulerError::InsufficientCapacity { .. } => "capacity",
            SchedulerError::JobExecution(_) => "batch_manager",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
