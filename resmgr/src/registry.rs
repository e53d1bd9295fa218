/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Job-type registry.
//!
//! Maps the `job_type` string carried by every [`Job`](crate::job::Job) to a
//! factory that builds the code which runs it.  Types are registered once at
//! startup; submissions naming an unregistered type are rejected before they
//! ever reach the queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::job::JobInput;

/// The executable side of a job.
///
/// Runs on a blocking thread.  An `Err` marks the job
/// [`Failure`](crate::job::JobStatus::Failure); it is *not* a dispatch error.
pub trait JobInstance: Send {
    fn execute(&self, input: &JobInput) -> Result<()>;
}

/// Builds a fresh [`JobInstance`] for each dispatch.
pub type JobFactory = Arc<dyn Fn() -> Box<dyn JobInstance> + Send + Sync>;

/// Registered job types.
#[derive(Clone, Default)]
pub struct JobRegistry {
    factories: HashMap<String, JobFactory>,
}

impl JobRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `noop` and `sleep` types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("noop", || NoopJob);
        registry.register("sleep", || SleepJob);
        registry
    }

    /// Register `job_type`, replacing any previous factory for it.
    pub fn register<F, J>(&mut self, job_type: impl Into<String>, factory: F)
    where
        F: Fn() -> J + Send + Sync + 'static,
        J: JobInstance + 'static,
    {
        self.factories.insert(
            job_type.into(),
            Arc::new(move || Box::new(factory()) as Box<dyn JobInstance>),
        );
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.factories.contains_key(job_type)
    }

    /// Instantiate `job_type`, or `None` if it was never registered.
    pub fn create(&self, job_type: &str) -> Option<Box<dyn JobInstance>> {
        self.factories.get(job_type).map(|factory| factory())
    }

    /// Registered type names, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

// ── Built-in job types ────────────────────────────────────────────────────────

/// Does nothing and succeeds.
pub struct NoopJob;

impl JobInstance for NoopJob {
    fn execute(&self, _input: &JobInput) -> Result<()> {
        Ok(())
    }
}

/// Sleeps for the number of milliseconds in the `millis` input (default 0).
pub struct SleepJob;

impl JobInstance for SleepJob {
    fn execute(&self, input: &JobInput) -> Result<()> {
        let millis: u64 = match input.get("millis") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid 'millis' input: {raw:?}"))?,
            None => 0,
        };
        std::thread::sleep(Duration::from_millis(millis));
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
