/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Resource manager configuration.
//!
//! The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   wait_seconds: 20
//! job_queue:
//!   max_size: 1000
//! nodes:
//!   node01: { address: "http://10.0.0.1:2001", capacity: 10 }
//!   node02: { address: "http://10.0.0.2:2001", capacity: 5 }
//! queues:
//!   default: [node01, node02]
//!   gpu: [node02]
//! jobs:
//!   - { name: warmup, queue: default, load: 1, job_type: noop }
//! ```
//!
//! Every section is optional.  A file without nodes falls back to a single
//! `default_node` of capacity 8 in queue `default`, the same layout used when
//! no file is given at all.  The order of a queue's node list is its initial
//! LRU order.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::job::{Job, JobInput, JobSpec};
use crate::jobqueue::DEFAULT_MAX_QUEUE_SIZE;
use crate::node::ResourceNode;

pub const DEFAULT_NODE: &str = "default_node";
pub const DEFAULT_QUEUE: &str = "default";
pub const DEFAULT_NODE_CAPACITY: u32 = 8;
pub const DEFAULT_WAIT_SECONDS: f64 = 20.0;

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Pause between two scheduling iterations, in seconds.
    pub wait_seconds: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            wait_seconds: DEFAULT_WAIT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JobQueueSettings {
    pub max_size: usize,
}

impl Default for JobQueueSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

/// Per-node fields as they appear under `nodes:`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeEntry {
    #[serde(default)]
    pub address: String,
    pub capacity: u32,
}

/// A job submitted at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedJob {
    pub name: String,
    pub queue: String,
    pub load: u32,
    #[serde(default = "default_job_type")]
    pub job_type: String,
    #[serde(default)]
    pub input: JobInput,
}

fn default_job_type() -> String {
    "noop".to_string()
}

impl SeedJob {
    pub fn to_spec(&self) -> JobSpec {
        JobSpec::new(
            Job::new(&self.name, &self.queue, &self.job_type, self.load),
            self.input.clone(),
        )
    }
}

// ── ResourceManagerConfig ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceManagerConfig {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub job_queue: JobQueueSettings,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeEntry>,
    #[serde(default)]
    pub queues: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub jobs: Vec<SeedJob>,
}

impl Default for ResourceManagerConfig {
    /// One `default_node` of capacity 8, alone in queue `default`.
    fn default() -> Self {
        let mut config = Self {
            scheduler: SchedulerSettings::default(),
            job_queue: JobQueueSettings::default(),
            nodes: BTreeMap::new(),
            queues: BTreeMap::new(),
            jobs: Vec::new(),
        };
        config.insert_default_node();
        config
    }
}

impl ResourceManagerConfig {
    /// Parse and validate the YAML file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, is not valid YAML, or
    /// fails [`validate`](Self::validate).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading resource manager configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config: Self =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        if config.nodes.is_empty() {
            warn!("No nodes found in configuration, using default node");
            config.insert_default_node();
        }

        config.validate()?;

        for (name, node) in &config.nodes {
            debug!(node = %name, address = %node.address, capacity = node.capacity, "configured node");
        }
        info!(
            nodes = config.nodes.len(),
            queues = config.queues.len(),
            seed_jobs = config.jobs.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Check cross-references and scalar ranges.
    ///
    /// # Errors
    /// * a queue lists a node that is not declared under `nodes`
    /// * a seed job names a queue that is not declared under `queues`
    /// * `wait_seconds` is zero, negative or not finite
    /// * `max_size` is zero
    pub fn validate(&self) -> Result<()> {
        for (queue, members) in &self.queues {
            for node in members {
                if !self.nodes.contains_key(node) {
                    bail!("queue '{queue}' references undeclared node '{node}'");
                }
            }
        }

        for job in &self.jobs {
            if !self.queues.contains_key(&job.queue) {
                bail!("seed job '{}' references undeclared queue '{}'", job.name, job.queue);
            }
        }

        self.wait_interval()?;

        if self.job_queue.max_size == 0 {
            bail!("job_queue.max_size must be at least 1");
        }
        Ok(())
    }

    /// `scheduler.wait_seconds` as a [`Duration`].
    ///
    /// Zero is rejected: the scheduling loop would never pause.
    pub fn wait_interval(&self) -> Result<Duration> {
        let secs = self.scheduler.wait_seconds;
        let interval = Duration::try_from_secs_f64(secs).with_context(|| {
            format!("scheduler.wait_seconds must be a positive number, got {secs}")
        })?;
        if interval.is_zero() {
            bail!("scheduler.wait_seconds must be a positive number, got {secs}");
        }
        Ok(interval)
    }

    /// Declared nodes, sorted by id.
    pub fn resource_nodes(&self) -> Vec<ResourceNode> {
        self.nodes
            .iter()
            .map(|(id, entry)| ResourceNode::new(id, &entry.address, entry.capacity))
            .collect()
    }

    fn insert_default_node(&mut self) {
        self.nodes.insert(
            DEFAULT_NODE.to_string(),
            NodeEntry {
                address: String::new(),
                capacity: DEFAULT_NODE_CAPACITY,
            },
        );
        let members = self.queues.entry(DEFAULT_QUEUE.to_string()).or_default();
        if !members.iter().any(|n| n == DEFAULT_NODE) {
            members.push(DEFAULT_NODE.to_string());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
