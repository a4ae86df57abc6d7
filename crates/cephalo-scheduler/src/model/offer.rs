// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource offers and the operations answered with them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// Reservation label naming the framework that owns a reservation.
pub const FRAMEWORK_ID_LABEL: &str = "FrameworkIdLabel";

/// Reservation label naming the task a reservation belongs to.
pub const TASK_ID_LABEL: &str = "TaskIdLabel";

/// Role of resources nobody has reserved.
pub const UNRESERVED_ROLE: &str = "*";

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// First value.
    pub begin: u64,
    /// Last value.
    pub end: u64,
}

impl Range {
    /// `begin..=end`
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// Number of values covered.
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.begin) + 1
    }

    /// Whether `value` lies in the range.
    pub fn contains(&self, value: u64) -> bool {
        self.begin <= value && value <= self.end
    }
}

/// Resource quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Countable amount (cpus, mem, disk).
    Scalar(f64),
    /// Ranges of values (ports).
    Ranges(Vec<Range>),
}

/// Reservation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Principal that made the reservation.
    pub principal: String,
    /// Labels tying the reservation to a task.
    pub labels: BTreeMap<String, String>,
}

/// Where disk space comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiskSource {
    /// A directory shared with other consumers.
    Path {
        /// Directory on the agent.
        root: String,
    },
    /// A dedicated mount, consumed whole.
    Mount {
        /// Mount point on the agent.
        root: String,
    },
}

impl DiskSource {
    /// Source root on the agent.
    pub fn root(&self) -> &str {
        match self {
            Self::Path { root } | Self::Mount { root } => root,
        }
    }
}

/// Persistent volume created on reserved disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume id.
    pub id: String,
    /// Principal that created the volume.
    pub principal: String,
    /// Path inside the task sandbox.
    pub container_path: String,
}

/// Disk details of a `disk` resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Source; `None` is the agent's root disk.
    pub source: Option<DiskSource>,
    /// Persistent volume living on this disk.
    pub volume: Option<Volume>,
}

/// One offered, reserved or launched resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// `cpus`, `mem`, `disk` or `ports`.
    pub name: String,
    /// Quantity.
    pub value: Value,
    /// Owning role, `*` when unreserved.
    pub role: String,
    /// Reservation details for reserved resources.
    pub reservation: Option<Reservation>,
    /// Disk details for `disk` resources.
    pub disk: Option<DiskInfo>,
}

impl Resource {
    /// Unreserved scalar resource.
    pub fn scalar(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            value: Value::Scalar(amount),
            role: UNRESERVED_ROLE.to_string(),
            reservation: None,
            disk: None,
        }
    }

    /// Unreserved range resource.
    pub fn ranges(name: impl Into<String>, ranges: Vec<Range>) -> Self {
        Self {
            name: name.into(),
            value: Value::Ranges(ranges),
            role: UNRESERVED_ROLE.to_string(),
            reservation: None,
            disk: None,
        }
    }

    /// Attach a disk source.
    pub fn with_source(mut self, source: DiskSource) -> Self {
        self.disk.get_or_insert_with(DiskInfo::default).source = Some(source);
        self
    }

    /// Attach a persistent volume.
    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.disk.get_or_insert_with(DiskInfo::default).volume = Some(volume);
        self
    }

    /// Reserve the resource for `role`.
    pub fn reserved(mut self, role: &str, reservation: Reservation) -> Self {
        self.role = role.to_string();
        self.reservation = Some(reservation);
        self
    }

    /// Scalar amount, if this is a scalar resource.
    pub fn scalar_value(&self) -> Option<f64> {
        match self.value {
            Value::Scalar(amount) => Some(amount),
            Value::Ranges(_) => None,
        }
    }

    /// Ranges, if this is a range resource.
    pub fn range_values(&self) -> &[Range] {
        match &self.value {
            Value::Ranges(ranges) => ranges,
            Value::Scalar(_) => &[],
        }
    }

    /// Whether nobody holds a reservation on this resource.
    pub fn is_unreserved(&self) -> bool {
        self.role == UNRESERVED_ROLE && self.reservation.is_none()
    }

    /// Value of a reservation label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.reservation
            .as_ref()
            .and_then(|r| r.labels.get(key))
            .map(String::as_str)
    }

    /// Disk source, if any.
    pub fn source(&self) -> Option<&DiskSource> {
        self.disk.as_ref().and_then(|d| d.source.as_ref())
    }

    /// Persistent volume, if any.
    pub fn volume(&self) -> Option<&Volume> {
        self.disk.as_ref().and_then(|d| d.volume.as_ref())
    }
}

/// Resources available on one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer identifier.
    pub id: String,
    /// Framework the offer was made to.
    pub framework_id: String,
    /// Agent identifier.
    pub slave_id: String,
    /// Agent hostname.
    pub hostname: String,
    /// Agent IP address.
    pub ip: String,
    /// Offered resources.
    pub resources: Vec<Resource>,
}

impl Offer {
    /// Distinct `(framework id, task id)` labels carried by reserved
    /// resources, in order of first appearance.
    pub fn reservation_labels(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for resource in &self.resources {
            if let (Some(framework), Some(task)) = (
                resource.label(FRAMEWORK_ID_LABEL),
                resource.label(TASK_ID_LABEL),
            ) && !pairs.contains(&(framework, task))
            {
                pairs.push((framework, task));
            }
        }
        pairs
    }
}

/// Shell command and environment of a launched task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    /// Shell command line.
    pub value: String,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
}

/// Container the command runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Docker image.
    pub image: String,
    /// Whether the container shares the agent's network namespace.
    pub host_network: bool,
}

/// Task description sent with a launch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Scheduler-level task id.
    pub task_id: TaskId,
    /// Human readable name.
    pub name: String,
    /// Agent to launch on.
    pub slave_id: String,
    /// Resources the task consumes.
    pub resources: Vec<Resource>,
    /// What to run.
    pub command: CommandInfo,
    /// Where to run it.
    pub container: ContainerInfo,
}

/// Offer operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Dynamically reserve resources.
    Reserve {
        /// Resources with reservation metadata.
        resources: Vec<Resource>,
    },
    /// Create persistent volumes on reserved disk.
    Create {
        /// Disk resources with volume metadata.
        volumes: Vec<Resource>,
    },
    /// Launch a task.
    Launch {
        /// The task.
        task: TaskInfo,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(framework: &str, task: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (FRAMEWORK_ID_LABEL.to_string(), framework.to_string()),
            (TASK_ID_LABEL.to_string(), task.to_string()),
        ])
    }

    #[test]
    fn test_reservation_labels() {
        let mut offer = Offer {
            id: "o1".to_string(),
            framework_id: "fw".to_string(),
            slave_id: "s1".to_string(),
            hostname: "host-1".to_string(),
            ip: "10.0.0.1".to_string(),
            resources: vec![Resource::scalar("cpus", 4.0)],
        };
        assert!(offer.reservation_labels().is_empty());

        offer.resources.push(Resource::scalar("mem", 1024.0).reserved(
            "ceph",
            Reservation {
                principal: "ceph".to_string(),
                labels: labels("fw", "t1"),
            },
        ));
        assert_eq!(offer.reservation_labels(), [("fw", "t1")]);
        assert!(offer.resources[0].is_unreserved());
        assert!(!offer.resources[1].is_unreserved());

        for (name, task) in [("cpus", "t2"), ("disk", "t1")] {
            offer.resources.push(Resource::scalar(name, 1.0).reserved(
                "ceph",
                Reservation {
                    principal: "ceph".to_string(),
                    labels: labels("fw", task),
                },
            ));
        }
        assert_eq!(offer.reservation_labels(), [("fw", "t1"), ("fw", "t2")]);
    }

    #[test]
    fn test_range_len() {
        assert_eq!(Range::new(31000, 31004).size(), 5);
        assert!(Range::new(31000, 31004).contains(31004));
        assert!(!Range::new(31000, 31004).contains(31005));
    }
}
