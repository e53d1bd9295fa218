/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core job data structures for the resource manager.
//!
//! Three types model a unit of work on its way through the scheduler:
//!
//! ```text
//! submitter ──►  JobSpec { Job, JobInput }  ──(JobQueue)──►  LruScheduler  ──►  BatchManager
//!                        ↑ routing + cost      ↑ pending               ↑ node chosen, load reserved
//! ```
//!
//! # Ownership model
//! The [`JobSpec`] is **owned** by the [`JobQueue`](crate::jobqueue::JobQueue)
//! while pending.  `get_next_job()` moves it out to the scheduler; a requeue
//! moves it back.  The authoritative copy of a job's status lives in the
//! [`JobRepository`](crate::jobrepo::JobRepository), which is updated on every
//! transition.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Job status ────────────────────────────────────────────────────────────────

/// Lifecycle of a job.
///
/// ```text
/// Queued ──► Scheduled ──► Executed ──► Success | Failure
///   ▲            │                  └──► Killed
///   └────────────┘  (no node / dispatch failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the job queue.
    #[default]
    Queued,
    /// Taken off the queue by the scheduler, no node reserved yet.
    Scheduled,
    /// Handed off to the batch manager and running on a node.
    Executed,
    /// Terminal: the job implementation returned successfully.
    Success,
    /// Terminal: the job implementation reported an error.
    Failure,
    /// Terminal: an operator killed the job.
    Killed,
}

impl JobStatus {
    /// Returns `true` once the job has left the scheduler's responsibility
    /// for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Killed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Executed => "executed",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Job ───────────────────────────────────────────────────────────────────────

/// Routing and accounting metadata for one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    // ── Identity ──────────────────────────────────────────────────────────────
    /// Unique job identifier.  Left empty by submitters; the job queue assigns
    /// a UUID on submission.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    // ── Routing ───────────────────────────────────────────────────────────────
    /// Queue whose nodes are eligible to run this job.
    pub queue_name: String,

    /// Registered job type that the batch manager instantiates to run the job.
    ///
    /// See [`JobRegistry`](crate::registry::JobRegistry).
    pub job_type: String,

    // ── Accounting ────────────────────────────────────────────────────────────
    /// Capacity units the job consumes on its node while running.
    pub load_value: u32,

    /// Current lifecycle state.
    pub status: JobStatus,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        queue_name: impl Into<String>,
        job_type: impl Into<String>,
        load_value: u32,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            queue_name: queue_name.into(),
            job_type: job_type.into(),
            load_value,
            status: JobStatus::Queued,
        }
    }

    /// Builder-style helper used by tests and seed jobs that want a fixed id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

// ── Job input ─────────────────────────────────────────────────────────────────

/// Opaque key → values payload handed to the job implementation.
///
/// The scheduler never looks inside; only the executing [`JobInstance`]
/// interprets it.  Keys are kept sorted so the payload serializes
/// deterministically.
///
/// [`JobInstance`]: crate::registry::JobInstance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobInput {
    values: BTreeMap<String, Vec<String>>,
}

impl JobInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values stored under `key` (empty slice when absent).
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ── JobSpec ───────────────────────────────────────────────────────────────────

/// A [`Job`] paired with its [`JobInput`]: the unit moved through the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job: Job,
    pub input: JobInput,
}

impl JobSpec {
    pub fn new(job: Job, input: JobInput) -> Self {
        Self { job, input }
    }

    pub fn id(&self) -> &str {
        &self.job.id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
