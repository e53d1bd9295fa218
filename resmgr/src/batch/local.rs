/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! [`BatchManager`] that runs jobs on the local tokio runtime.
//!
//! Each dispatched job becomes one task that runs the registered
//! [`JobInstance`](crate::registry::JobInstance) on a blocking thread.  When
//! the job ends (or is killed) its status is written to the repository and its
//! load is released on the monitor.
//!
//! Whoever removes a job from the running table owns its cleanup, so a kill
//! racing a natural completion releases the load exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{BatchManager, JobExecutionError};
use crate::job::{JobSpec, JobStatus};
use crate::jobrepo::JobRepository;
use crate::monitor::Monitor;
use crate::node::ResourceNode;
use crate::registry::JobRegistry;

#[derive(Debug)]
struct RunningJob {
    node_id: String,
    load_value: u32,
    handle: JoinHandle<()>,
}

type RunningTable = Arc<Mutex<HashMap<String, RunningJob>>>;

/// Local, in-process batch manager.
pub struct LocalBatchManager {
    registry: Arc<JobRegistry>,
    monitor: Arc<dyn Monitor>,
    repo: Arc<dyn JobRepository>,
    running: RunningTable,
    down_nodes: Mutex<HashSet<String>>,
}

impl LocalBatchManager {
    pub fn new(
        registry: Arc<JobRegistry>,
        monitor: Arc<dyn Monitor>,
        repo: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            registry,
            monitor,
            repo,
            running: Arc::new(Mutex::new(HashMap::new())),
            down_nodes: Mutex::new(HashSet::new()),
        }
    }

    /// Mark a node up or down.  Dispatch to a down node fails with
    /// [`JobExecutionError::NodeUnavailable`].
    pub fn set_node_alive(&self, node_id: &str, alive: bool) {
        let mut down = self.down_nodes.lock().unwrap_or_else(PoisonError::into_inner);
        if alive {
            down.remove(node_id);
        } else {
            down.insert(node_id.to_string());
        }
        info!(node = %node_id, alive, "node liveness changed");
    }

    pub fn is_node_alive(&self, node_id: &str) -> bool {
        !self
            .down_nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(node_id)
    }

    /// Number of jobs currently running.
    pub fn running_count(&self) -> usize {
        lock_running(&self.running).len()
    }
}

fn lock_running(running: &RunningTable) -> MutexGuard<'_, HashMap<String, RunningJob>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record the final status of `job_id` and release its load, unless a kill
/// already did so.
fn finish_job(
    running: &RunningTable,
    monitor: &dyn Monitor,
    repo: &dyn JobRepository,
    job_id: &str,
    node: &ResourceNode,
    status: JobStatus,
) {
    let Some(entry) = lock_running(running).remove(job_id) else {
        return;
    };

    if let Err(e) = repo.set_status(job_id, status) {
        warn!(job = %job_id, %status, error = %e, "failed to record job completion status");
    }
    release_load(monitor, job_id, node, &entry);
    info!(job = %job_id, node = %node.id, %status, "job finished");
}

/// Give back the load `entry` holds.  Detached entries hold none.
fn release_load(monitor: &dyn Monitor, job_id: &str, node: &ResourceNode, entry: &RunningJob) {
    if entry.load_value == 0 {
        return;
    }
    if let Err(e) = monitor.reduce_load(node, entry.load_value) {
        warn!(job = %job_id, node = %node.id, error = %e, "failed to release job load");
    }
}

#[async_trait]
impl BatchManager for LocalBatchManager {
    async fn execute_remotely(
        &self,
        spec: &JobSpec,
        node: &ResourceNode,
    ) -> Result<(), JobExecutionError> {
        if !self.is_node_alive(&node.id) {
            return Err(JobExecutionError::NodeUnavailable {
                node: node.id.clone(),
            });
        }

        let instance = self.registry.create(&spec.job.job_type).ok_or_else(|| {
            JobExecutionError::UnknownJobType {
                job_type: spec.job.job_type.clone(),
            }
        })?;

        let job_id = spec.job.id.clone();
        if let Err(e) = self.repo.set_status(&job_id, JobStatus::Executed) {
            warn!(job = %job_id, error = %e, "failed to record executing status");
        }

        let input = spec.input.clone();
        let task_node = node.clone();
        let task_job_id = job_id.clone();
        let running = Arc::clone(&self.running);
        let monitor = Arc::clone(&self.monitor);
        let repo = Arc::clone(&self.repo);

        // Held across the spawn so the task cannot finish (and try to remove
        // its entry) before the entry exists.
        let mut table = lock_running(&self.running);
        let handle = tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || instance.execute(&input)).await;
            let status = match outcome {
                Ok(Ok(())) => JobStatus::Success,
                Ok(Err(e)) => {
                    warn!(job = %task_job_id, error = %e, "job failed");
                    JobStatus::Failure
                }
                Err(e) => {
                    warn!(job = %task_job_id, error = %e, "job panicked");
                    JobStatus::Failure
                }
            };
            finish_job(
                &running,
                monitor.as_ref(),
                repo.as_ref(),
                &task_job_id,
                &task_node,
                status,
            );
        });
        table.insert(
            job_id.clone(),
            RunningJob {
                node_id: node.id.clone(),
                load_value: spec.job.load_value,
                handle,
            },
        );
        drop(table);

        info!(job = %job_id, node = %node.id, address = %node.address, "job dispatched");
        Ok(())
    }

    fn execution_node(&self, job_id: &str) -> Option<String> {
        lock_running(&self.running)
            .get(job_id)
            .map(|entry| entry.node_id.clone())
    }

    fn kill_job(&self, job_id: &str, node: &ResourceNode) -> bool {
        let Some(entry) = lock_running(&self.running).remove(job_id) else {
            warn!(job = %job_id, "kill requested for a job that is not running");
            return false;
        };
        entry.handle.abort();

        if let Err(e) = self.repo.set_status(job_id, JobStatus::Killed) {
            warn!(job = %job_id, error = %e, "failed to record killed status");
        }
        release_load(self.monitor.as_ref(), job_id, node, &entry);
        info!(job = %job_id, node = %node.id, "job killed");
        true
    }

    fn jobs_on_node(&self, node_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = lock_running(&self.running)
            .iter()
            .filter(|(_, entry)| entry.node_id == node_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn detach_node(&self, node_id: &str) -> Vec<String> {
        let mut ids = Vec::new();
        for (id, entry) in lock_running(&self.running).iter_mut() {
            if entry.node_id == node_id {
                entry.load_value = 0;
                ids.push(id.clone());
            }
        }
        ids.sort();
        if !ids.is_empty() {
            info!(node = %node_id, jobs = ?ids, "running jobs detached from removed node");
        }
        ids
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
