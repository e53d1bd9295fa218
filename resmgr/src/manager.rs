/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Resource manager facade.
//!
//! [`ResourceManager`] wires the components together from a
//! [`ResourceManagerConfig`] and is the one entry point the binary (or an
//! embedding service) talks to:
//!
//! ```text
//!   submit_job ──► FifoJobQueue ──► LruScheduler ──► LocalBatchManager
//!                      │                 │                  │
//!                      ▼                 ▼                  ▼
//!              MemoryJobRepository  LruQueueManager   AssignmentMonitor
//! ```
//!
//! Administrative calls (nodes, queues, capacity) may run while the
//! scheduling loop is active.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{BatchManager, LocalBatchManager};
use crate::config::ResourceManagerConfig;
use crate::job::{Job, JobInput, JobSpec, JobStatus};
use crate::jobqueue::{FifoJobQueue, JobQueue, JobQueueError};
use crate::jobrepo::{JobRepository, JobRepositoryError, MemoryJobRepository};
use crate::monitor::{AssignmentMonitor, Monitor, MonitorError};
use crate::node::ResourceNode;
use crate::queue::{LruQueueManager, QueueManager, QueueManagerError};
use crate::registry::JobRegistry;
use crate::scheduler::{LruScheduler, SchedulerError};

// ── Error type ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    QueueManager(#[from] QueueManagerError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    JobQueue(#[from] JobQueueError),

    #[error(transparent)]
    JobRepository(#[from] JobRepositoryError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("no job implementation registered for type '{job_type}'")]
    UnknownJobType { job_type: String },

    #[error("job '{id}' is still {status}")]
    JobNotFinished { id: String, status: JobStatus },
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// Current load of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLoad {
    pub node_id: String,
    pub load: u32,
    pub capacity: u32,
}

impl fmt::Display for NodeLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.load, self.capacity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub node: ResourceNode,
    pub load: u32,
    /// Queues the node belongs to, alphabetical.
    pub queues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueReport {
    pub queue: String,
    /// Member nodes in current LRU order.
    pub nodes: Vec<String>,
    pub total_load: u64,
    pub total_capacity: u64,
}

// ── ResourceManager ───────────────────────────────────────────────────────────

pub struct ResourceManager {
    monitor: Arc<AssignmentMonitor>,
    queues: Arc<LruQueueManager>,
    repo: Arc<MemoryJobRepository>,
    job_queue: Arc<FifoJobQueue>,
    batch: Arc<LocalBatchManager>,
    registry: Arc<JobRegistry>,
    scheduler: Arc<LruScheduler>,
}

impl ResourceManager {
    /// Build a manager with the built-in job types.
    pub fn from_config(config: &ResourceManagerConfig) -> Result<Self> {
        Self::with_registry(config, JobRegistry::with_builtins())
    }

    /// Build a manager running the job types in `registry`.
    ///
    /// Seed jobs are *not* submitted here; see
    /// [`submit_seed_jobs`](Self::submit_seed_jobs).
    pub fn with_registry(config: &ResourceManagerConfig, registry: JobRegistry) -> Result<Self> {
        config.validate().context("Refusing to start with an invalid configuration")?;

        let monitor = Arc::new(AssignmentMonitor::with_nodes(config.resource_nodes()));
        let queues = Arc::new(LruQueueManager::from(QueueManager::from_queues(
            config.queues.clone(),
        )));
        let repo = Arc::new(MemoryJobRepository::new());
        let job_queue = Arc::new(FifoJobQueue::new(config.job_queue.max_size, repo.clone()));
        let registry = Arc::new(registry);
        let batch = Arc::new(LocalBatchManager::new(
            registry.clone(),
            monitor.clone(),
            repo.clone(),
        ));
        let scheduler = Arc::new(
            LruScheduler::new(monitor.clone(), batch.clone(), job_queue.clone(), queues.clone())
                .with_wait_interval(config.wait_interval()?),
        );

        info!(
            nodes = config.nodes.len(),
            queues = config.queues.len(),
            job_types = ?registry.job_types(),
            "resource manager initialised"
        );

        Ok(Self {
            monitor,
            queues,
            repo,
            job_queue,
            batch,
            registry,
            scheduler,
        })
    }

    pub fn scheduler(&self) -> &Arc<LruScheduler> {
        &self.scheduler
    }

    pub fn batch_manager(&self) -> &Arc<LocalBatchManager> {
        &self.batch
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Start the scheduling loop on the current runtime.
    pub fn spawn_scheduler(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(async move { scheduler.run(shutdown).await })
    }

    // ── Nodes ─────────────────────────────────────────────────────────────────

    /// Register a node with the monitor.  It takes no work until it is added
    /// to a queue.
    pub fn add_node(&self, node: ResourceNode) -> Result<(), ManagerError> {
        Ok(self.monitor.add_node(node)?)
    }

    /// Take a node out of every queue and forget it.  Returns the queues it
    /// was removed from.
    ///
    /// Jobs already running on the node keep running but no longer release
    /// load when they end, so a node registered again under the same id
    /// starts from a clean account.
    pub async fn remove_node(&self, node_id: &str) -> Result<Vec<String>, ManagerError> {
        self.monitor.get_node_by_id(node_id)?;

        let _placement = self.scheduler.hold_placement().await;
        let detached = self.batch.detach_node(node_id);
        if !detached.is_empty() {
            warn!(node = %node_id, jobs = ?detached, "node removed with jobs still running");
        }
        let removed_from = self.queues.remove_node_everywhere(node_id);
        self.monitor.remove_node_by_id(node_id)?;
        Ok(removed_from)
    }

    /// Mark a node up or down for dispatch.  The scheduler keeps choosing a
    /// down node; each hand-off to it fails, is rolled back and the job is
    /// requeued.
    pub fn set_node_alive(&self, node_id: &str, alive: bool) -> Result<(), ManagerError> {
        self.monitor.get_node_by_id(node_id)?;
        self.batch.set_node_alive(node_id, alive);
        Ok(())
    }

    pub fn set_node_capacity(&self, node_id: &str, capacity: u32) -> Result<(), ManagerError> {
        Ok(self.monitor.set_node_capacity(node_id, capacity)?)
    }

    pub fn node_load(&self, node_id: &str) -> Result<NodeLoad, ManagerError> {
        let node = self.monitor.get_node_by_id(node_id)?;
        let load = self.monitor.get_load(&node)?;
        Ok(NodeLoad {
            node_id: node.id,
            load,
            capacity: node.capacity,
        })
    }

    /// Every known node with its load and queue memberships, sorted by id.
    pub fn node_report(&self) -> Result<Vec<NodeReport>, ManagerError> {
        self.monitor
            .get_nodes()?
            .into_iter()
            .map(|node| {
                let load = self.monitor.get_load(&node)?;
                let queues = self.queues.get_queues_with_node(&node.id);
                Ok(NodeReport { node, load, queues })
            })
            .collect()
    }

    // ── Queues ────────────────────────────────────────────────────────────────

    pub fn add_queue(&self, name: &str) {
        self.queues.add_queue(name);
    }

    pub fn remove_queue(&self, name: &str) {
        self.queues.remove_queue(name);
    }

    /// Add a node the monitor knows about to `queue`.
    ///
    /// # Errors
    /// [`MonitorError::NodeNotFound`] for an unregistered node,
    /// [`QueueManagerError::UnknownQueue`] for an unknown queue.
    pub fn add_node_to_queue(&self, node_id: &str, queue: &str) -> Result<(), ManagerError> {
        self.monitor.get_node_by_id(node_id)?;
        Ok(self.queues.add_node_to_queue(node_id, queue)?)
    }

    pub fn remove_node_from_queue(&self, node_id: &str, queue: &str) -> Result<(), ManagerError> {
        Ok(self.queues.remove_node_from_queue(node_id, queue)?)
    }

    /// Members of `queue` in current LRU order.
    pub fn nodes_in_queue(&self, queue: &str) -> Result<Vec<String>, ManagerError> {
        Ok(self.queues.get_nodes(queue)?)
    }

    pub fn queues_with_node(&self, node_id: &str) -> Vec<String> {
        self.queues.get_queues_with_node(node_id)
    }

    pub fn queues(&self) -> Vec<String> {
        self.queues.get_queues()
    }

    /// Aggregate load and capacity per queue.  A node shared by two queues is
    /// counted in both.
    pub fn queue_report(&self) -> Result<Vec<QueueReport>, ManagerError> {
        let mut reports = Vec::new();
        for queue in self.queues.get_queues() {
            let nodes = self.queues.get_nodes(&queue)?;
            let mut total_load = 0u64;
            let mut total_capacity = 0u64;
            for node_id in &nodes {
                let node = self.monitor.get_node_by_id(node_id)?;
                total_load += u64::from(self.monitor.get_load(&node)?);
                total_capacity += u64::from(node.capacity);
            }
            reports.push(QueueReport {
                queue,
                nodes,
                total_load,
                total_capacity,
            });
        }
        Ok(reports)
    }

    // ── Jobs ──────────────────────────────────────────────────────────────────

    /// Submit a job for scheduling.  Returns its id.
    ///
    /// # Errors
    /// * [`ManagerError::UnknownJobType`] if no implementation is registered
    /// * [`QueueManagerError::UnknownQueue`] if the job's queue does not exist
    /// * [`JobQueueError::Full`] if the pending queue is at capacity
    pub fn submit_job(&self, job: Job, input: JobInput) -> Result<String, ManagerError> {
        if !self.registry.contains(&job.job_type) {
            return Err(ManagerError::UnknownJobType {
                job_type: job.job_type,
            });
        }
        self.queues.get_nodes(&job.queue_name)?;

        let name = job.name.clone();
        let id = self.job_queue.add_job(JobSpec::new(job, input))?;
        info!(job = %id, name = %name, "job submitted");
        Ok(id)
    }

    /// Submit every seed job in `config`, stopping at the first failure.
    pub fn submit_seed_jobs(&self, config: &ResourceManagerConfig) -> Result<Vec<String>> {
        config
            .jobs
            .iter()
            .map(|seed| {
                let spec = seed.to_spec();
                self.submit_job(spec.job, spec.input)
                    .with_context(|| format!("Failed to submit seed job '{}'", seed.name))
            })
            .collect()
    }

    /// Run a job on the node registered at `address`, bypassing the job
    /// queue and LRU selection.  Returns the job id.
    ///
    /// The node's load is reserved for the job's lifetime exactly as for a
    /// scheduled job.  A refused job leaves no record behind.
    ///
    /// # Errors
    /// * [`ManagerError::UnknownJobType`] if no implementation is registered
    /// * [`MonitorError::UnknownAddress`] if no node has that address
    /// * [`ManagerError::Scheduler`] if the node lacks room or the hand-off
    ///   failed
    pub async fn execute_on_node(
        &self,
        mut job: Job,
        input: JobInput,
        address: &str,
    ) -> Result<String, ManagerError> {
        if !self.registry.contains(&job.job_type) {
            return Err(ManagerError::UnknownJobType {
                job_type: job.job_type,
            });
        }
        let node = self.monitor.get_node_by_address(address)?;

        if job.id.is_empty() {
            job.id = Uuid::new_v4().to_string();
        }
        job.status = JobStatus::Scheduled;
        let spec = JobSpec::new(job, input);
        self.repo.add_job(&spec)?;

        let id = spec.job.id.clone();
        if let Err(e) = self.scheduler.dispatch_to(&spec, &node.id).await {
            if let Err(re) = self.repo.remove_job(&id) {
                warn!(job = %id, error = %re, "could not discard refused job");
            }
            return Err(e.into());
        }
        info!(job = %id, node = %node.id, address = %address, "job executed on requested node");
        Ok(id)
    }

    pub fn job_info(&self, job_id: &str) -> Result<JobSpec, ManagerError> {
        Ok(self.repo.get_job_by_id(job_id)?)
    }

    pub fn is_job_complete(&self, job_id: &str) -> Result<bool, ManagerError> {
        Ok(self.repo.is_job_complete(job_id)?)
    }

    /// Node currently running `job_id`.
    pub fn execution_node(&self, job_id: &str) -> Option<String> {
        self.batch.execution_node(job_id)
    }

    /// Kill a running job.  Returns `false` if it is not running.
    pub fn kill_job(&self, job_id: &str) -> Result<bool, ManagerError> {
        let Some(node_id) = self.batch.execution_node(job_id) else {
            return Ok(false);
        };
        let node = match self.monitor.get_node_by_id(&node_id) {
            Ok(node) => node,
            // Removed while the job ran: there is no load left to release.
            Err(MonitorError::NodeNotFound { .. }) => ResourceNode::new(node_id, "", 0),
            Err(e) => return Err(e.into()),
        };
        Ok(self.batch.kill_job(job_id, &node))
    }

    /// Forget a finished job.
    ///
    /// # Errors
    /// [`ManagerError::JobNotFinished`] while the job is pending or running.
    pub fn remove_job(&self, job_id: &str) -> Result<(), ManagerError> {
        let status = self.repo.get_job_by_id(job_id)?.job.status;
        if !status.is_terminal() {
            return Err(ManagerError::JobNotFinished {
                id: job_id.to_string(),
                status,
            });
        }
        self.repo.remove_job(job_id)?;
        info!(job = %job_id, status = %status, "job record removed");
        Ok(())
    }

    /// Drop every pending job.  Dropped jobs are recorded as killed.
    pub fn purge_queue(&self) {
        self.job_queue.purge();
    }

    /// Number of pending jobs.
    pub fn queue_size(&self) -> usize {
        self.job_queue.size()
    }

    pub fn queue_capacity(&self) -> usize {
        self.job_queue.capacity()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
