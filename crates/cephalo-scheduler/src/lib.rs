// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cephalo Scheduler - Ceph Task Orchestration
//!
//! Runs the monitors and OSDs of a Ceph cluster on an offer-based cluster
//! scheduler. Every daemon is a task with durable state in the KV store, a
//! dynamic reservation and a persistent volume that survive restarts of both
//! the daemon and the scheduler.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   offers / statuses   ┌──────────────────────────┐
//! │  SchedulerDriver   │ ────────────────────▶ │     SchedulerRuntime     │
//! │ (cluster scheduler)│ ◀──────────────────── │  event loop · crash stop │
//! └────────────────────┘ accept/decline/kill   └──────────────────────────┘
//!                                                           │
//!                                                           ▼
//!                         ┌──────────────────────────────────────────────┐
//!                         │                   Engine                     │
//!                         │  per-task behaviour · offer matching ·       │
//!                         │  dependency gating · goals · timers          │
//!                         └──────────────────────────────────────────────┘
//!                            │              │                  │
//!                            ▼              ▼                  ▼
//!                     ┌────────────┐ ┌─────────────┐ ┌──────────────────┐
//!                     │  matcher   │ │   render    │ │  stores (typed)  │
//!                     │ reserve /  │ │ ceph.conf · │ │ config · tasks · │
//!                     │ confirm    │ │ keyrings    │ │ secrets · fw id  │
//!                     └────────────┘ └─────────────┘ └──────────────────┘
//!                                                              │
//!                                                              ▼
//!                                                    cephalo-kv (crashing)
//! ```
//!
//! # Task Lifecycle
//!
//! 1. A task is created when the deployment asks for more of its role.
//! 2. Once its dependencies allow, an unreserved offer is answered with
//!    reserve and create-volume operations labelled with the task id.
//! 3. The labelled offer that comes back confirms the reservation and is
//!    answered with the launch.
//! 4. Crashes back off exponentially and relaunch on the same reservation.
//!
//! # Persisted Layout
//!
//! | Path | Content |
//! |------|---------|
//! | `config.json` | operator deployment document |
//! | `frameworkId` | framework id |
//! | `secrets.json` | cluster fsid and cephx keys |
//! | `tasks/<id>` | one task record |

#![deny(missing_docs)]

/// Environment configuration.
pub mod config;

/// Operator deployment document.
pub mod deployment;

/// Orchestration engine.
pub mod engine;

/// Error types.
pub mod error;

/// Launch commands and task descriptions.
pub mod launch;

/// Offer matching.
pub mod matcher;

/// Tasks, offers and statuses.
pub mod model;

/// Configuration bundle rendering.
pub mod render;

/// Embeddable runtime.
pub mod runtime;

/// Typed stores over the KV layer.
pub mod stores;

/// Cluster scheduler driver.
pub mod transport;

pub use config::Config;
pub use engine::{Behavior, Engine, EngineSettings, Event, SleepReason, TaskView};
pub use error::{Error, Result};
pub use runtime::{EngineHandle, SchedulerRuntime};
pub use transport::{MockDriver, SchedulerDriver};
