/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Job persistence.
//!
//! The repository holds the authoritative copy of every submitted job and its
//! status.  The job queue writes `Queued` / `Scheduled`, the batch manager
//! writes `Executed` and the terminal states, and status queries read from
//! here.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;

use crate::job::{JobSpec, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobRepositoryError {
    #[error("job '{id}' not found in repository")]
    JobNotFound { id: String },

    #[error("job repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage for submitted jobs.
pub trait JobRepository: Send + Sync {
    /// Store a newly submitted job (overwrites an existing one with the same id).
    fn add_job(&self, spec: &JobSpec) -> Result<(), JobRepositoryError>;

    /// Replace the stored copy of an existing job.
    fn update_job(&self, spec: &JobSpec) -> Result<(), JobRepositoryError>;

    fn get_job_by_id(&self, id: &str) -> Result<JobSpec, JobRepositoryError>;

    /// `true` once the job reached a terminal status.
    fn is_job_complete(&self, id: &str) -> Result<bool, JobRepositoryError> {
        Ok(self.get_job_by_id(id)?.job.status.is_terminal())
    }

    fn remove_job(&self, id: &str) -> Result<(), JobRepositoryError>;

    /// Convenience: load, change the status, store.
    fn set_status(&self, id: &str, status: JobStatus) -> Result<(), JobRepositoryError> {
        let mut spec = self.get_job_by_id(id)?;
        spec.job.status = status;
        self.update_job(&spec)
    }
}

/// In-memory [`JobRepository`].
#[derive(Debug, Default)]
pub struct MemoryJobRepository {
    jobs: Mutex<HashMap<String, JobSpec>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, JobSpec>>, JobRepositoryError> {
        self.jobs
            .lock()
            .map_err(|_| JobRepositoryError::Unavailable("job map lock poisoned".to_string()))
    }
}

impl JobRepository for MemoryJobRepository {
    fn add_job(&self, spec: &JobSpec) -> Result<(), JobRepositoryError> {
        self.lock()?.insert(spec.job.id.clone(), spec.clone());
        debug!(job = %spec.job.id, "job stored");
        Ok(())
    }

    fn update_job(&self, spec: &JobSpec) -> Result<(), JobRepositoryError> {
        let mut jobs = self.lock()?;
        let stored = jobs
            .get_mut(&spec.job.id)
            .ok_or_else(|| JobRepositoryError::JobNotFound {
                id: spec.job.id.clone(),
            })?;
        *stored = spec.clone();
        debug!(job = %spec.job.id, status = %spec.job.status, "job updated");
        Ok(())
    }

    fn get_job_by_id(&self, id: &str) -> Result<JobSpec, JobRepositoryError> {
        self.lock()?
            .get(id)
            .cloned()
            .ok_or_else(|| JobRepositoryError::JobNotFound { id: id.to_string() })
    }

    fn remove_job(&self, id: &str) -> Result<(), JobRepositoryError> {
        self.lock()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| JobRepositoryError::JobNotFound { id: id.to_string() })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
