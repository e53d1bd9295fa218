/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Least-recently-used job scheduler.
//!
//! [`LruScheduler`] drives the resource manager: every `wait_interval` it pulls
//! one [`JobSpec`] off the [`JobQueue`], picks a node from the job's queue,
//! reserves the job's load on the [`Monitor`], marks the node as most recently
//! used and hands the job to the [`BatchManager`].
//!
//! # Placement policy
//! Nodes are checked in the queue's LRU order (longest without work first).
//! The **first** node whose headroom (`capacity − current load`) is at least
//! the job's `load_value` wins.  When no node fits, the job goes back on the
//! queue; that is an expected outcome under load, not an error.
//!
//! # State machine (one job)
//! ```text
//! pending ──► node-selected ──► load-reserved ──► dispatched ──► dispatched-ok
//!    ▲             │ (none)                           │
//!    └─────────────┴──────── dispatch-failed ◄────────┘  (load released, requeued)
//! ```
//!
//! # Concurrency
//! Checking a node's room and reserving it are two separate monitor calls, and
//! reading the LRU order and marking a node used are two separate queue calls.
//! The whole body of [`schedule()`](LruScheduler::schedule) therefore runs
//! under one scheduler-wide async mutex, held across the dispatch `.await`.
//! Two concurrent attempts can never both pass the capacity check against the
//! same stale reading, nor both pick the same "least used" node.
//!
//! # Failure policy
//! The loop never exits on error.  Every failure is logged and the loop moves
//! on; requeue failures are logged and swallowed so a double failure costs at
//! most one job, never the loop.
//!
//! # Example
//! ```rust,ignore
//! let scheduler = Arc::new(
//!     LruScheduler::new(monitor, batch, job_queue, queue_manager)
//!         .with_wait_interval(Duration::from_secs(20)),
//! );
//! let token = CancellationToken::new();
//! tokio::spawn({
//!     let scheduler = Arc::clone(&scheduler);
//!     let token = token.clone();
//!     async move { scheduler.run(token).await }
//! });
//! ```

pub mod error;

pub use error::SchedulerError;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::BatchManager;
use crate::job::JobSpec;
use crate::jobqueue::JobQueue;
use crate::monitor::{Monitor, MonitorError};
use crate::node::ResourceNode;
use crate::queue::LruQueueManager;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default pause between two scheduling iterations.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(20);

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// Result of one scheduling *attempt* (not of the job itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Load reserved and the batch manager accepted the job.
    Dispatched { node_id: String },

    /// Load was reserved but the hand-off failed; the reservation was released
    /// and the job requeued.
    DispatchFailed { node_id: String },

    /// No node in the job's queue had room; the job was requeued.
    NoNodeAvailable,
}

impl ScheduleOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, ScheduleOutcome::Dispatched { .. })
    }
}

/// What a single loop iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The job queue was empty.
    Idle,

    /// Taking the next job off the queue failed.
    DequeueFailed,

    /// A job went through [`LruScheduler::schedule`].
    Scheduled(ScheduleOutcome),

    /// [`LruScheduler::schedule`] returned an error; the job was requeued
    /// (best-effort).
    Failed(SchedulerError),
}

// ── LruScheduler ──────────────────────────────────────────────────────────────

/// The resource manager's scheduling loop and placement policy.
pub struct LruScheduler {
    monitor: Arc<dyn Monitor>,
    batch: Arc<dyn BatchManager>,
    job_queue: Arc<dyn JobQueue>,
    queue_manager: Arc<LruQueueManager>,
    wait_interval: Duration,

    /// Serializes `schedule()` / `node_available()` bodies.
    schedule_lock: Mutex<()>,
}

impl LruScheduler {
    /// Create a scheduler with the default 20 s wait interval.
    pub fn new(
        monitor: Arc<dyn Monitor>,
        batch: Arc<dyn BatchManager>,
        job_queue: Arc<dyn JobQueue>,
        queue_manager: Arc<LruQueueManager>,
    ) -> Self {
        Self {
            monitor,
            batch,
            job_queue,
            queue_manager,
            wait_interval: DEFAULT_WAIT_INTERVAL,
            schedule_lock: Mutex::new(()),
        }
    }

    /// Override the pause between loop iterations.
    pub fn with_wait_interval(mut self, wait_interval: Duration) -> Self {
        self.wait_interval = wait_interval;
        self
    }

    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    pub fn batch_manager(&self) -> &Arc<dyn BatchManager> {
        &self.batch
    }

    pub fn job_queue(&self) -> &Arc<dyn JobQueue> {
        &self.job_queue
    }

    pub fn queue_manager(&self) -> &Arc<LruQueueManager> {
        &self.queue_manager
    }

    // ── Main loop ─────────────────────────────────────────────────────────────

    /// Run the scheduling loop until `shutdown` is cancelled.
    ///
    /// Cancellation is observed during the wait between iterations; an
    /// iteration that already started (including its dispatch) completes
    /// first.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            wait_secs = self.wait_interval.as_secs_f64(),
            "scheduler loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.wait_interval) => {}
            }
            self.tick().await;
        }

        info!("scheduler loop stopped");
    }

    /// One loop iteration without the leading sleep.
    pub async fn tick(&self) -> Tick {
        if self.job_queue.is_empty() {
            return Tick::Idle;
        }

        let spec = match self.job_queue.get_next_job() {
            Ok(spec) => {
                info!(
                    job = %spec.job.id,
                    queue = %spec.job.queue_name,
                    "obtained job from queue, scheduling for execution"
                );
                spec
            }
            Err(e) => {
                warn!(error = %e, "error getting next job from job queue");
                return Tick::DequeueFailed;
            }
        };

        match self.schedule(&spec).await {
            Ok(outcome) => Tick::Scheduled(outcome),
            Err(e) => {
                warn!(
                    job = %spec.job.id,
                    source = e.source_kind(),
                    error = %e,
                    "error scheduling job"
                );
                self.requeue_best_effort(spec);
                Tick::Failed(e)
            }
        }
    }

    // ── Scheduling ────────────────────────────────────────────────────────────

    /// Try to place and dispatch `spec`.
    ///
    /// Requeues the job itself when no node has room or when the dispatch
    /// fails; in the latter case the load reservation is released first.
    ///
    /// # Errors
    /// * [`SchedulerError::QueueManager`] if the job's queue does not exist.
    /// * [`SchedulerError::Monitor`] if probing a node or reserving its load
    ///   failed.  Nothing is reserved in either case.
    pub async fn schedule(&self, spec: &JobSpec) -> Result<ScheduleOutcome, SchedulerError> {
        let _guard = self.schedule_lock.lock().await;

        let queue = spec.job.queue_name.as_str();
        let load = spec.job.load_value;

        let Some(node) = self.find_node(spec)? else {
            info!(
                job = %spec.job.id,
                queue = %queue,
                load = load,
                "no node available, requeueing job"
            );
            self.requeue_best_effort(spec.clone());
            return Ok(ScheduleOutcome::NoNodeAvailable);
        };

        if let Err(e) = self.monitor.assign_load(&node, load) {
            warn!(
                node = %node.id,
                load = load,
                error = %e,
                "error assigning load to resource node"
            );
            return Err(e.into());
        }

        // The queue can only vanish here through a concurrent administrative
        // removal; the reservation stands and the dispatch goes ahead.
        if let Err(e) = self.queue_manager.used_node(queue, &node.id) {
            warn!(queue = %queue, node = %node.id, error = %e, "could not mark node as used");
        }

        info!(
            job = %spec.job.id,
            name = %spec.job.name,
            node = %node.id,
            load = load,
            "assigning job to node"
        );

        match self.batch.execute_remotely(spec, &node).await {
            Ok(()) => Ok(ScheduleOutcome::Dispatched { node_id: node.id }),
            Err(e) => {
                warn!(
                    job = %spec.job.id,
                    node = %node.id,
                    address = %node.address,
                    error = %e,
                    "error executing job on node, rolling back"
                );
                self.requeue_best_effort(spec.clone());
                if let Err(e) = self.monitor.reduce_load(&node, load) {
                    warn!(
                        node = %node.id,
                        load = load,
                        error = %e,
                        "failed to release load after dispatch failure"
                    );
                }
                Ok(ScheduleOutcome::DispatchFailed { node_id: node.id })
            }
        }
    }

    /// Dispatch `spec` to the node `node_id`, bypassing queue selection.
    ///
    /// The load is reserved under the same lock as [`schedule()`](Self::schedule)
    /// and released again if the hand-off fails.  Nothing is requeued and the
    /// node's LRU position is left alone: the caller chose the node.
    ///
    /// # Errors
    /// * [`SchedulerError::Monitor`] if the node is unknown or its load cannot
    ///   be read or reserved.
    /// * [`SchedulerError::InsufficientCapacity`] if the job does not fit;
    ///   nothing is reserved.
    /// * [`SchedulerError::JobExecution`] if the batch manager refused the
    ///   job; the reservation has been released.
    pub async fn dispatch_to(&self, spec: &JobSpec, node_id: &str) -> Result<(), SchedulerError> {
        let _guard = self.schedule_lock.lock().await;

        let load = spec.job.load_value;
        let (node, current) = self.read_node(node_id)?;
        if !node.admits(load, current) {
            return Err(SchedulerError::InsufficientCapacity {
                node: node.id.clone(),
                requested: load,
                available: node.headroom(current),
            });
        }

        self.monitor.assign_load(&node, load)?;
        info!(job = %spec.job.id, node = %node.id, load = load, "dispatching job to requested node");

        if let Err(e) = self.batch.execute_remotely(spec, &node).await {
            warn!(job = %spec.job.id, node = %node.id, error = %e, "direct dispatch failed, rolling back");
            if let Err(e) = self.monitor.reduce_load(&node, load) {
                warn!(node = %node.id, load = load, error = %e, "failed to release load after dispatch failure");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Block placement decisions while the returned guard lives.
    ///
    /// Node removal holds it so that no job can be placed on a node between
    /// its running jobs being detached and the node being forgotten.
    pub async fn hold_placement(&self) -> MutexGuard<'_, ()> {
        self.schedule_lock.lock().await
    }

    /// The node [`schedule()`](Self::schedule) would pick for `spec` right
    /// now, or `None` if no node in the job's queue has room.
    ///
    /// # Errors
    /// Same as [`schedule()`](Self::schedule) for queue and monitor failures.
    pub async fn node_available(
        &self,
        spec: &JobSpec,
    ) -> Result<Option<ResourceNode>, SchedulerError> {
        let _guard = self.schedule_lock.lock().await;
        self.find_node(spec)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers (caller holds `schedule_lock`)
    // ─────────────────────────────────────────────────────────────────────────

    /// First node of the job's queue, in LRU order, with enough headroom.
    ///
    /// A monitor failure on any checked node aborts the whole attempt: it is an
    /// infrastructure problem, not a sign that the node is busy.
    fn find_node(&self, spec: &JobSpec) -> Result<Option<ResourceNode>, SchedulerError> {
        let queue = spec.job.queue_name.as_str();
        let requested = spec.job.load_value;

        for node_id in self.queue_manager.get_nodes(queue)? {
            let (node, current) = self.read_node(&node_id).map_err(|e| {
                warn!(node = %node_id, error = %e, "error getting load on node");
                e
            })?;

            debug!(
                node = %node.id,
                load = current,
                capacity = node.capacity,
                requested = requested,
                "checked node"
            );

            if node.admits(requested, current) {
                return Ok(Some(node));
            }
        }

        debug!(queue = %queue, requested = requested, "no node in queue can take the job");
        Ok(None)
    }

    fn read_node(&self, node_id: &str) -> Result<(ResourceNode, u32), MonitorError> {
        let node = self.monitor.get_node_by_id(node_id)?;
        let load = self.monitor.get_load(&node)?;
        Ok((node, load))
    }

    /// Requeue `spec`, logging (never propagating) a failure.
    fn requeue_best_effort(&self, spec: JobSpec) {
        let id = spec.job.id.clone();
        match self.job_queue.requeue_job(spec) {
            Ok(_) => debug!(job = %id, "job requeued"),
            Err(e) => warn!(job = %id, error = %e, "failed to requeue job, job may be lost"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    use async_trait::async_trait;

    use crate::batch::JobExecutionError;
    use crate::job::{Job, JobInput, JobStatus};
    use crate::jobqueue::{FifoJobQueue, JobQueueError};
    use crate::jobrepo::{JobRepository, JobRepositoryError, MemoryJobRepository};
    use crate::monitor::AssignmentMonitor;
    use crate::queue::QueueManager;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Batch manager that records dispatches and never releases load.
    #[derive(Default)]
    struct RecordingBatch {
        fail: AtomicBool,
        calls: AtomicUsize,
        delay: Option<Duration>,
        dispatched: std::sync::Mutex<Vec<(String, String)>>,
    }

    impl RecordingBatch {
        fn failing() -> Self {
            let batch = Self::default();
            batch.fail.store(true, Ordering::SeqCst);
            batch
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn dispatched_nodes(&self) -> Vec<String> {
            self.dispatched
                .lock()
                .unwrap()
                .iter()
                .map(|(_, node)| node.clone())
                .collect()
        }
    }

    #[async_trait]
    impl BatchManager for RecordingBatch {
        async fn execute_remotely(
            &self,
            spec: &JobSpec,
            node: &ResourceNode,
        ) -> Result<(), JobExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(JobExecutionError::Dispatch("injected failure".into()));
            }
            self.dispatched
                .lock()
                .unwrap()
                .push((spec.job.id.clone(), node.id.clone()));
            Ok(())
        }

        fn execution_node(&self, job_id: &str) -> Option<String> {
            self.dispatched
                .lock()
                .unwrap()
                .iter()
                .find(|(job, _)| job == job_id)
                .map(|(_, node)| node.clone())
        }

        fn kill_job(&self, _job_id: &str, _node: &ResourceNode) -> bool {
            false
        }

        fn jobs_on_node(&self, node_id: &str) -> Vec<String> {
            self.dispatched
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, node)| node == node_id)
                .map(|(job, _)| job.clone())
                .collect()
        }

        fn detach_node(&self, node_id: &str) -> Vec<String> {
            self.jobs_on_node(node_id)
        }
    }

    /// Monitor whose load lookup fails for one node, and optionally every
    /// reservation.
    struct FlakyMonitor {
        inner: AssignmentMonitor,
        broken_node: Option<&'static str>,
        fail_assign: bool,
    }

    impl Monitor for FlakyMonitor {
        fn get_node_by_id(&self, node_id: &str) -> Result<ResourceNode, MonitorError> {
            self.inner.get_node_by_id(node_id)
        }

        fn get_node_by_address(&self, address: &str) -> Result<ResourceNode, MonitorError> {
            self.inner.get_node_by_address(address)
        }

        fn get_nodes(&self) -> Result<Vec<ResourceNode>, MonitorError> {
            self.inner.get_nodes()
        }

        fn get_load(&self, node: &ResourceNode) -> Result<u32, MonitorError> {
            if self.broken_node == Some(node.id.as_str()) {
                return Err(MonitorError::Unavailable("metrics feed down".into()));
            }
            self.inner.get_load(node)
        }

        fn assign_load(&self, node: &ResourceNode, amount: u32) -> Result<(), MonitorError> {
            if self.fail_assign {
                return Err(MonitorError::Unavailable("load store read-only".into()));
            }
            self.inner.assign_load(node, amount)
        }

        fn reduce_load(&self, node: &ResourceNode, amount: u32) -> Result<(), MonitorError> {
            self.inner.reduce_load(node, amount)
        }

        fn add_node(&self, node: ResourceNode) -> Result<(), MonitorError> {
            self.inner.add_node(node)
        }

        fn remove_node_by_id(&self, node_id: &str) -> Result<(), MonitorError> {
            self.inner.remove_node_by_id(node_id)
        }

        fn set_node_capacity(&self, node_id: &str, capacity: u32) -> Result<(), MonitorError> {
            self.inner.set_node_capacity(node_id, capacity)
        }
    }

    /// Job queue that never runs dry, fails every other dequeue and every
    /// requeue.
    #[derive(Default)]
    struct UnreliableQueue {
        dequeues: AtomicUsize,
        requeues: AtomicUsize,
    }

    impl JobQueue for UnreliableQueue {
        fn is_empty(&self) -> bool {
            false
        }

        fn get_next_job(&self) -> Result<JobSpec, JobQueueError> {
            let n = self.dequeues.fetch_add(1, Ordering::SeqCst);
            match n % 4 {
                0 | 2 => Err(JobQueueError::Repository(JobRepositoryError::Unavailable(
                    "disk full".into(),
                ))),
                1 => Ok(spec_for(&format!("j{n}"), "default", 1)),
                _ => Ok(spec_for(&format!("j{n}"), "ghost", 1)),
            }
        }

        fn requeue_job(&self, _spec: JobSpec) -> Result<String, JobQueueError> {
            self.requeues.fetch_add(1, Ordering::SeqCst);
            Err(JobQueueError::Repository(JobRepositoryError::Unavailable(
                "disk full".into(),
            )))
        }

        fn add_job(&self, _spec: JobSpec) -> Result<String, JobQueueError> {
            Err(JobQueueError::Full { max_size: 0 })
        }

        fn size(&self) -> usize {
            0
        }

        fn capacity(&self) -> usize {
            0
        }

        fn queued_jobs(&self) -> Vec<JobSpec> {
            Vec::new()
        }

        fn purge(&self) {}
    }

    // ── Harness ───────────────────────────────────────────────────────────────

    fn spec_for(id: &str, queue: &str, load: u32) -> JobSpec {
        JobSpec::new(
            Job::new(id, queue, "noop", load).with_id(id),
            JobInput::new(),
        )
    }

    fn queue_manager(queues: &[(&str, &[&str])]) -> Arc<LruQueueManager> {
        Arc::new(LruQueueManager::from(QueueManager::from_queues(
            queues.iter().map(|(q, nodes)| (*q, nodes.to_vec())),
        )))
    }

    fn nodes(specs: &[(&str, u32)]) -> Vec<ResourceNode> {
        specs
            .iter()
            .map(|(id, cap)| ResourceNode::new(*id, format!("http://{id}:2001"), *cap))
            .collect()
    }

    struct Harness {
        sched: Arc<LruScheduler>,
        monitor: Arc<AssignmentMonitor>,
        queue: Arc<FifoJobQueue>,
        repo: Arc<MemoryJobRepository>,
        batch: Arc<RecordingBatch>,
        queues: Arc<LruQueueManager>,
    }

    impl Harness {
        fn new(node_specs: &[(&str, u32)], queues: &[(&str, &[&str])], batch: RecordingBatch) -> Self {
            let monitor = Arc::new(AssignmentMonitor::with_nodes(nodes(node_specs)));
            let repo = Arc::new(MemoryJobRepository::new());
            let queue = Arc::new(FifoJobQueue::new(100, repo.clone()));
            let batch = Arc::new(batch);
            let queues = queue_manager(queues);
            let sched = Arc::new(
                LruScheduler::new(monitor.clone(), batch.clone(), queue.clone(), queues.clone())
                    .with_wait_interval(Duration::from_millis(1)),
            );
            Self {
                sched,
                monitor,
                queue,
                repo,
                batch,
                queues,
            }
        }

        fn submit(&self, name: &str, queue: &str, load: u32) -> String {
            self.queue
                .add_job(JobSpec::new(Job::new(name, queue, "noop", load), JobInput::new()))
                .unwrap()
        }

        fn load(&self, node_id: &str) -> u32 {
            let node = self.monitor.get_node_by_id(node_id).unwrap();
            self.monitor.get_load(&node).unwrap()
        }

        fn status(&self, job_id: &str) -> JobStatus {
            self.repo.get_job_by_id(job_id).unwrap().job.status
        }
    }

    fn dispatched(node: &str) -> Tick {
        Tick::Scheduled(ScheduleOutcome::Dispatched {
            node_id: node.to_string(),
        })
    }

    // ── Placement ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_fit_then_no_node_scenario() {
        let h = Harness::new(
            &[("N1", 10), ("N2", 5)],
            &[("default", &["N1", "N2"])],
            RecordingBatch::default(),
        );

        h.submit("first", "default", 8);
        assert_eq!(h.sched.tick().await, dispatched("N1"));
        assert_eq!(h.load("N1"), 8);

        let second = h.submit("second", "default", 8);
        assert_eq!(
            h.sched.tick().await,
            Tick::Scheduled(ScheduleOutcome::NoNodeAvailable)
        );
        assert_eq!(h.load("N1"), 8, "no reservation without a node");
        assert_eq!(h.load("N2"), 0);
        assert_eq!(h.queue.size(), 1, "job must be back on the queue");
        assert_eq!(h.status(&second), JobStatus::Queued);
        assert_eq!(h.batch.calls(), 1);
    }

    #[tokio::test]
    async fn equally_eligible_nodes_are_used_round_robin() {
        let h = Harness::new(
            &[("A", 10), ("B", 10), ("C", 10)],
            &[("default", &["A", "B", "C"])],
            RecordingBatch::default(),
        );
        for i in 0..3 {
            h.submit(&format!("j{i}"), "default", 1);
        }

        assert_eq!(h.sched.tick().await, dispatched("A"));
        assert_eq!(h.sched.tick().await, dispatched("B"));
        assert_eq!(h.sched.tick().await, dispatched("C"));
        assert_eq!(h.queues.get_nodes("default").unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn full_nodes_are_skipped_in_lru_order() {
        let h = Harness::new(
            &[("A", 2), ("B", 10)],
            &[("default", &["A", "B"])],
            RecordingBatch::default(),
        );
        h.submit("big", "default", 5);

        assert_eq!(h.sched.tick().await, dispatched("B"));
        // B was used, A was not: A is still first.
        assert_eq!(h.queues.get_nodes("default").unwrap(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn node_available_honours_headroom() {
        let h = Harness::new(
            &[("N1", 10), ("N2", 5)],
            &[("default", &["N1", "N2"])],
            RecordingBatch::default(),
        );
        let n1 = h.monitor.get_node_by_id("N1").unwrap();
        h.monitor.assign_load(&n1, 7).unwrap();

        let fits_n1 = spec_for("a", "default", 3);
        let fits_n2 = spec_for("b", "default", 4);
        let fits_none = spec_for("c", "default", 6);

        let pick = |spec: JobSpec| {
            let sched = Arc::clone(&h.sched);
            async move { sched.node_available(&spec).await.unwrap().map(|n| n.id) }
        };
        assert_eq!(pick(fits_n1).await.as_deref(), Some("N1"));
        assert_eq!(pick(fits_n2).await.as_deref(), Some("N2"));
        assert_eq!(pick(fits_none).await, None, "no node is not an error");

        // Probing reserves nothing.
        assert_eq!(h.load("N1"), 7);
        assert_eq!(h.load("N2"), 0);
    }

    #[tokio::test]
    async fn nodes_outside_the_jobs_queue_are_never_chosen() {
        let h = Harness::new(
            &[("big", 100), ("small", 1)],
            &[("q1", &["big"]), ("q2", &["small"])],
            RecordingBatch::default(),
        );

        h.submit("j", "q2", 5);
        assert_eq!(
            h.sched.tick().await,
            Tick::Scheduled(ScheduleOutcome::NoNodeAvailable)
        );
        assert_eq!(h.load("big"), 0);

        h.queue.purge();
        h.submit("k", "q2", 1);
        assert_eq!(h.sched.tick().await, dispatched("small"));
        assert!(!h.batch.dispatched_nodes().contains(&"big".to_string()));
    }

    #[tokio::test]
    async fn unknown_queue_is_an_error_and_the_job_is_requeued() {
        let h = Harness::new(&[("n1", 10)], &[("default", &["n1"])], RecordingBatch::default());

        let err = h
            .sched
            .node_available(&spec_for("x", "nonexistent", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::QueueManager(_)));

        let id = h.submit("lost", "nonexistent", 1);
        assert!(matches!(
            h.sched.tick().await,
            Tick::Failed(SchedulerError::QueueManager(_))
        ));
        assert_eq!(h.queue.size(), 1);
        assert_eq!(h.status(&id), JobStatus::Queued);
    }

    // ── Load accounting ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn successful_dispatch_reserves_exactly_the_job_load() {
        let h = Harness::new(&[("n1", 10)], &[("default", &["n1"])], RecordingBatch::default());
        let n1 = h.monitor.get_node_by_id("n1").unwrap();
        h.monitor.assign_load(&n1, 2).unwrap();

        let outcome = h.sched.schedule(&spec_for("j", "default", 3)).await.unwrap();
        assert!(outcome.is_dispatched());
        assert_eq!(h.load("n1"), 5);
        assert_eq!(h.batch.execution_node("j").as_deref(), Some("n1"));
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_rolls_back_load_and_requeues() {
        let h = Harness::new(
            &[("n1", 10), ("n2", 10)],
            &[("default", &["n1", "n2"])],
            RecordingBatch::failing(),
        );
        let n1 = h.monitor.get_node_by_id("n1").unwrap();
        h.monitor.assign_load(&n1, 1).unwrap();
        let id = h.submit("j", "default", 4);

        assert_eq!(
            h.sched.tick().await,
            Tick::Scheduled(ScheduleOutcome::DispatchFailed {
                node_id: "n1".into()
            })
        );
        assert_eq!(h.load("n1"), 1, "load must return to its pre-reservation value");
        assert_eq!(h.queue.size(), 1);
        assert_eq!(h.status(&id), JobStatus::Queued);
        // The failed node still counts as used, so the retry prefers n2.
        assert_eq!(h.queues.get_nodes("default").unwrap(), vec!["n2", "n1"]);
    }

    #[tokio::test]
    async fn monitor_lookup_failure_aborts_selection() {
        let monitor = Arc::new(FlakyMonitor {
            inner: AssignmentMonitor::with_nodes(nodes(&[("bad", 10), ("good", 10)])),
            broken_node: Some("bad"),
            fail_assign: false,
        });
        let batch = Arc::new(RecordingBatch::default());
        let queue = Arc::new(FifoJobQueue::new(10, Arc::new(MemoryJobRepository::new())));
        let sched = LruScheduler::new(
            monitor,
            batch.clone(),
            queue,
            queue_manager(&[("default", &["bad", "good"])]),
        );

        let err = sched
            .node_available(&spec_for("j", "default", 1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SchedulerError::Monitor(MonitorError::Unavailable("metrics feed down".into())),
            "a failed lookup must not be skipped in favour of the next node"
        );
        assert!(sched.schedule(&spec_for("j", "default", 1)).await.is_err());
        assert_eq!(batch.calls(), 0);
    }

    #[tokio::test]
    async fn reservation_failure_is_an_error_without_dispatch() {
        let monitor = Arc::new(FlakyMonitor {
            inner: AssignmentMonitor::with_nodes(nodes(&[("n1", 10)])),
            broken_node: None,
            fail_assign: true,
        });
        let batch = Arc::new(RecordingBatch::default());
        let repo = Arc::new(MemoryJobRepository::new());
        let queue = Arc::new(FifoJobQueue::new(10, repo.clone()));
        let queues = queue_manager(&[("default", &["n1"])]);
        let sched = LruScheduler::new(monitor.clone(), batch.clone(), queue.clone(), queues.clone());

        let id = queue
            .add_job(JobSpec::new(Job::new("j", "default", "noop", 2), JobInput::new()))
            .unwrap();
        assert!(matches!(
            sched.tick().await,
            Tick::Failed(SchedulerError::Monitor(_))
        ));
        assert_eq!(batch.calls(), 0);
        assert_eq!(
            monitor.get_load(&monitor.get_node_by_id("n1").unwrap()).unwrap(),
            0
        );
        assert_eq!(queue.size(), 1, "loop requeues after a scheduling error");
        assert_eq!(repo.get_job_by_id(&id).unwrap().job.status, JobStatus::Queued);
        assert_eq!(queues.get_nodes("default").unwrap(), vec!["n1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_never_oversubscribe_a_node() {
        let h = Harness::new(
            &[("n1", 10)],
            &[("default", &["n1"])],
            RecordingBatch::slow(Duration::from_millis(20)),
        );

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let sched = Arc::clone(&h.sched);
                tokio::spawn(async move { sched.schedule(&spec_for(&format!("j{i}"), "default", 4)).await })
            })
            .collect();

        let mut dispatched = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_dispatched() {
                dispatched += 1;
            }
        }
        assert_eq!(dispatched, 2, "only two jobs of load 4 fit in capacity 10");
        assert_eq!(h.load("n1"), 8);
        assert_eq!(h.queue.size(), 3);
    }

    // ── Direct dispatch ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn dispatch_to_reserves_load_on_the_named_node() {
        let h = Harness::new(
            &[("A", 10), ("B", 10)],
            &[("default", &["A", "B"])],
            RecordingBatch::default(),
        );

        h.sched.dispatch_to(&spec_for("j", "default", 4), "B").await.unwrap();
        assert_eq!(h.load("B"), 4);
        assert_eq!(h.load("A"), 0);
        assert_eq!(h.batch.dispatched_nodes(), vec!["B"]);
        // The caller picked the node: LRU order and the job queue are untouched.
        assert_eq!(h.queues.get_nodes("default").unwrap(), vec!["A", "B"]);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn dispatch_to_a_full_node_reserves_nothing() {
        let h = Harness::new(&[("A", 5)], &[("default", &["A"])], RecordingBatch::default());
        let a = h.monitor.get_node_by_id("A").unwrap();
        h.monitor.assign_load(&a, 3).unwrap();

        let err = h
            .sched
            .dispatch_to(&spec_for("j", "default", 3), "A")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SchedulerError::InsufficientCapacity {
                node: "A".into(),
                requested: 3,
                available: 2,
            }
        );
        assert_eq!(h.load("A"), 3);
        assert_eq!(h.batch.calls(), 0);

        assert!(matches!(
            h.sched.dispatch_to(&spec_for("j", "default", 1), "ghost").await,
            Err(SchedulerError::Monitor(MonitorError::NodeNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn failed_direct_dispatch_is_rolled_back_and_reported() {
        let h = Harness::new(&[("A", 10)], &[("default", &["A"])], RecordingBatch::failing());

        let err = h
            .sched
            .dispatch_to(&spec_for("j", "default", 4), "A")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::JobExecution(JobExecutionError::Dispatch(_))));
        assert_eq!(err.source_kind(), "batch_manager");
        assert_eq!(h.load("A"), 0);
        assert!(h.queue.is_empty(), "direct dispatch never requeues");
    }

    // ── Main loop ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn tick_on_empty_queue_is_idle() {
        let h = Harness::new(&[("n1", 10)], &[("default", &["n1"])], RecordingBatch::default());
        assert_eq!(h.sched.tick().await, Tick::Idle);
        assert_eq!(h.batch.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loop_survives_consecutive_dispatch_failures() {
        let h = Harness::new(&[("n1", 10)], &[("default", &["n1"])], RecordingBatch::failing());
        h.submit("doomed", "default", 3);

        let token = CancellationToken::new();
        let loop_task = tokio::spawn({
            let sched = Arc::clone(&h.sched);
            let token = token.clone();
            async move { sched.run(token).await }
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        while h.batch.calls() < 50 {
            assert!(Instant::now() < deadline, "loop stalled at {} calls", h.batch.calls());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(!loop_task.is_finished(), "loop must still be running");

        // ...and still scheduling after fifty failures.
        let seen = h.batch.calls();
        while h.batch.calls() <= seen {
            assert!(Instant::now() < deadline, "loop stopped invoking schedule()");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        token.cancel();
        loop_task.await.unwrap();
        assert_eq!(h.load("n1"), 0, "every failed dispatch was rolled back");
        assert_eq!(h.queue.size(), 1, "the job is never lost");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loop_survives_dequeue_schedule_and_requeue_failures() {
        let queue = Arc::new(UnreliableQueue::default());
        let monitor = Arc::new(AssignmentMonitor::with_nodes(nodes(&[("n1", 10)])));
        let sched = Arc::new(
            LruScheduler::new(
                monitor.clone(),
                Arc::new(RecordingBatch::failing()),
                queue.clone(),
                queue_manager(&[("default", &["n1"])]),
            )
            .with_wait_interval(Duration::from_millis(1)),
        );

        let token = CancellationToken::new();
        let loop_task = tokio::spawn({
            let sched = Arc::clone(&sched);
            let token = token.clone();
            async move { sched.run(token).await }
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        while queue.dequeues.load(Ordering::SeqCst) < 60 {
            assert!(Instant::now() < deadline, "loop stalled");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(!loop_task.is_finished());

        token.cancel();
        loop_task.await.unwrap();
        // Dispatch failures and unknown-queue errors both tried to requeue.
        assert!(queue.requeues.load(Ordering::SeqCst) >= 25);
        let n1 = monitor.get_node_by_id("n1").unwrap();
        assert_eq!(monitor.get_load(&n1).unwrap(), 0);
    }

    #[tokio::test]
    async fn cancelled_loop_exits_during_wait() {
        let h = Harness::new(&[("n1", 10)], &[("default", &["n1"])], RecordingBatch::default());
        let sched = Arc::new(
            LruScheduler::new(
                h.monitor.clone(),
                h.batch.clone(),
                h.queue.clone(),
                h.queues.clone(),
            ), // default 20 s wait
        );
        assert_eq!(sched.wait_interval(), DEFAULT_WAIT_INTERVAL);

        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), sched.run(token))
            .await
            .expect("a cancelled loop must not wait out the interval");
    }
}
