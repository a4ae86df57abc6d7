// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable per-task record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task identifier. Also used as the scheduler-level task id and as the
/// persistent volume id.
pub type TaskId = Uuid;

/// Cluster role of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ceph monitor.
    Monitor,
    /// Ceph object storage daemon.
    Osd,
}

impl Role {
    /// Short daemon name used in task names and config sections.
    pub fn daemon(self) -> &'static str {
        match self {
            Self::Monitor => "mon",
            Self::Osd => "osd",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.daemon())
    }
}

/// Desired or observed run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// The daemon should be (or was last seen) running.
    Running,
    /// The daemon should be (or was last seen) stopped.
    Paused,
}

/// Where a launched task is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Agent hostname.
    pub hostname: String,
    /// Agent IP address.
    pub ip: String,
    /// Primary port (monitor port, or first OSD bind port).
    pub port: u16,
}

impl Location {
    /// `ip:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Durable state of one cluster task.
///
/// `id`, `role` and `created_at` never change. A confirmed reservation always
/// names the agent holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentState {
    /// Task identifier.
    pub id: TaskId,
    /// Ceph cluster the task belongs to.
    pub cluster: String,
    /// Cluster role.
    pub role: Role,
    /// Creation time, used for matching priority and bootstrap order.
    pub created_at: DateTime<Utc>,
    /// Operator-desired run state.
    #[serde(default)]
    pub goal: Option<RunState>,
    /// Last observed or launched run state.
    #[serde(default)]
    pub last_launched: Option<RunState>,
    /// Whether an offer has confirmed this task's reservation.
    #[serde(default)]
    pub reservation_confirmed: bool,
    /// Agent holding the reservation.
    #[serde(default)]
    pub slave_id: Option<String>,
    /// Where the task runs.
    #[serde(default)]
    pub location: Option<Location>,
}

impl PersistentState {
    /// A fresh task that should run.
    pub fn new(cluster: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster: cluster.into(),
            role,
            created_at: Utc::now(),
            goal: Some(RunState::Running),
            last_launched: None,
            reservation_confirmed: false,
            slave_id: None,
            location: None,
        }
    }

    /// Check the record's invariants.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.reservation_confirmed && self.slave_id.is_none() {
            return Err("confirmed reservation without slave id");
        }
        Ok(())
    }

    /// Whether the task wants to run.
    pub fn wants_running(&self) -> bool {
        self.goal == Some(RunState::Running)
    }

    /// Whether the daemon was seen running and can be reached.
    pub fn is_live(&self) -> bool {
        self.last_launched == Some(RunState::Running) && self.location.is_some()
    }

    /// Matching and bootstrap priority: oldest first, ties by id.
    pub fn priority(&self) -> (DateTime<Utc>, TaskId) {
        (self.created_at, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_reservation_needs_slave() {
        let mut state = PersistentState::new("ceph", Role::Monitor);
        assert!(state.validate().is_ok());

        state.reservation_confirmed = true;
        assert!(state.validate().is_err());

        state.slave_id = Some("slave-0".to_string());
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_wire_format() {
        let mut state = PersistentState::new("ceph", Role::Osd);
        state.last_launched = Some(RunState::Paused);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["role"], "osd");
        assert_eq!(json["goal"], "running");
        assert_eq!(json["lastLaunched"], "paused");
        assert_eq!(json["reservationConfirmed"], false);

        let parsed: PersistentState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }
}
