/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! resmgr – least-recently-used cluster resource manager
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── node         – compute node identity and capacity
//! ├── job          – job metadata, input payload, status
//! ├── queue/       – queue → node membership, LRU ordering
//! ├── monitor/     – node registry and per-node load accounting
//! ├── jobrepo      – job record store
//! ├── jobqueue     – pending-work FIFO
//! ├── registry     – job type → implementation
//! ├── batch/       – dispatch and local execution
//! ├── scheduler/   – LRU placement policy and scheduling loop
//! ├── config/      – YAML cluster configuration
//! └── manager      – facade wiring the above together
//! ```

pub mod batch;
pub mod config;
pub mod job;
pub mod jobqueue;
pub mod jobrepo;
pub mod manager;
pub mod monitor;
pub mod node;
pub mod queue;
pub mod registry;
pub mod scheduler;
