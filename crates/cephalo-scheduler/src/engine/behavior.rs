// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-task behaviour states.

use std::fmt;

use serde::Serialize;

/// Why a task is sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepReason {
    /// Waiting for another task (e.g. a running monitor).
    Dependency,
    /// The goal is not `Running`.
    Paused,
    /// Waiting out a crash backoff.
    Backoff,
}

/// In-memory protocol state of one task.
///
/// ```text
///            ┌──────────── reservation timeout ───────────┐
///            ▼                                            │
/// Sleeping ⇄ AwaitingOffer ── unreserved offer ──▶ Reserving
///    ▲            ▲                                       │ labelled offer
///    │            │ relaunch                              ▼
///    │         Killing ◀── goal Paused / removal ──── Launching
///    │            ▲                                       │ running status
///    └─ backoff ──┴─────────── Running ◀──────────────────┘
/// ```
///
/// `Reconciling` is entered on restart for tasks that may still be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum Behavior {
    /// Blocked on a dependency, a paused goal or a backoff timer.
    Sleeping(SleepReason),
    /// Eligible for offer matching.
    AwaitingOffer,
    /// Reserve and create emitted, waiting for the labelled offer.
    Reserving,
    /// Launch emitted, waiting for a running status.
    Launching,
    /// Running.
    Running,
    /// Kill emitted, waiting for a terminal status.
    Killing,
    /// Restart recovery, waiting for the scheduler to report the task.
    Reconciling,
}

impl Behavior {
    /// Whether the task holds no process and no pending protocol step, so its
    /// state can be recomputed from goal and dependencies at any time.
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            Self::AwaitingOffer | Self::Sleeping(SleepReason::Dependency)
        )
    }

    /// Whether a process may exist for the task.
    pub fn may_be_running(self) -> bool {
        matches!(
            self,
            Self::Launching | Self::Running | Self::Killing | Self::Reconciling
        )
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sleeping(reason) => write!(f, "sleeping({:?})", reason),
            Self::AwaitingOffer => f.write_str("awaiting_offer"),
            Self::Reserving => f.write_str("reserving"),
            Self::Launching => f.write_str("launching"),
            Self::Running => f.write_str("running"),
            Self::Killing => f.write_str("killing"),
            Self::Reconciling => f.write_str("reconciling"),
        }
    }
}
