/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pending-work queue.
//!
//! [`JobQueue`] is the scheduler's source of jobs.  [`FifoJobQueue`] serves
//! them first-in first-out and appends requeued jobs at the back, so a job
//! that currently fits nowhere does not block the jobs behind it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::job::{JobSpec, JobStatus};
use crate::jobrepo::{JobRepository, JobRepositoryError};

/// Default number of jobs a [`FifoJobQueue`] accepts from submitters.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobQueueError {
    #[error("job queue is empty")]
    Empty,

    #[error("job queue is full (max {max_size} jobs)")]
    Full { max_size: usize },

    #[error(transparent)]
    Repository(#[from] JobRepositoryError),
}

/// Repository of pending work.
pub trait JobQueue: Send + Sync {
    /// Non-blocking emptiness check.
    fn is_empty(&self) -> bool;

    /// Remove and return the next pending job.
    fn get_next_job(&self) -> Result<JobSpec, JobQueueError>;

    /// Put a job back for a later retry.  Returns the job id.
    fn requeue_job(&self, spec: JobSpec) -> Result<String, JobQueueError>;

    /// Submit a new job.  Returns the (possibly freshly assigned) job id.
    fn add_job(&self, spec: JobSpec) -> Result<String, JobQueueError>;

    /// Number of pending jobs.
    fn size(&self) -> usize;

    /// Maximum number of pending jobs accepted from submitters.
    fn capacity(&self) -> usize;

    /// Snapshot of the pending jobs in dequeue order.
    fn queued_jobs(&self) -> Vec<JobSpec>;

    /// Drop every pending job, recording each as killed.
    fn purge(&self);
}

// ── FifoJobQueue ──────────────────────────────────────────────────────────────

/// First-in first-out [`JobQueue`] that mirrors every status change into a
/// [`JobRepository`].
pub struct FifoJobQueue {
    pending: Mutex<VecDeque<JobSpec>>,
    max_size: usize,
    repo: Arc<dyn JobRepository>,
}

impl FifoJobQueue {
    pub fn new(max_size: usize, repo: Arc<dyn JobRepository>) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            max_size,
            repo,
        }
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repo
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<JobSpec>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobQueue for FifoJobQueue {
    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn get_next_job(&self) -> Result<JobSpec, JobQueueError> {
        let mut spec = self.lock().pop_front().ok_or(JobQueueError::Empty)?;
        spec.job.status = JobStatus::Scheduled;
        if let Err(e) = self.repo.update_job(&spec) {
            warn!(job = %spec.job.id, error = %e, "status not recorded after dequeue");
        }
        Ok(spec)
    }

    fn requeue_job(&self, mut spec: JobSpec) -> Result<String, JobQueueError> {
        spec.job.status = JobStatus::Queued;
        let id = spec.job.id.clone();

        // The job goes back on the queue before the repository is touched so a
        // repository failure can never drop it.
        self.lock().push_back(spec.clone());
        if let Err(e) = self.repo.update_job(&spec) {
            warn!(job = %id, error = %e, "status not recorded after requeue");
        }
        Ok(id)
    }

    fn add_job(&self, mut spec: JobSpec) -> Result<String, JobQueueError> {
        let mut pending = self.lock();
        if pending.len() >= self.max_size {
            return Err(JobQueueError::Full {
                max_size: self.max_size,
            });
        }

        if spec.job.id.is_empty() {
            spec.job.id = Uuid::new_v4().to_string();
        }
        spec.job.status = JobStatus::Queued;
        self.repo.add_job(&spec)?;

        info!(
            job = %spec.job.id,
            name = %spec.job.name,
            queue = %spec.job.queue_name,
            load = spec.job.load_value,
            "job added to job queue"
        );
        let id = spec.job.id.clone();
        pending.push_back(spec);
        Ok(id)
    }

    fn size(&self) -> usize {
        self.lock().len()
    }

    fn capacity(&self) -> usize {
        self.max_size
    }

    fn queued_jobs(&self) -> Vec<JobSpec> {
        self.lock().iter().cloned().collect()
    }

    fn purge(&self) {
        let dropped: Vec<JobSpec> = self.lock().drain(..).collect();
        for spec in &dropped {
            if let Err(e) = self.repo.set_status(&spec.job.id, JobStatus::Killed) {
                warn!(job = %spec.job.id, error = %e, "status not recorded after purge");
            }
        }
        info!(dropped = dropped.len(), "job queue purged");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
