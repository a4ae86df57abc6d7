// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource matching.
//!
//! Two kinds of offers are matched here:
//!
//! - **Unreserved** resources, which a pending task may reserve. Only
//!   resources with role `*` and no reservation count.
//! - **Reserved** resources carrying a task's `(FrameworkIdLabel,
//!   TaskIdLabel)`, which confirm a reservation and are launched on as-is.
//!
//! Disk rules: `root` takes the requested size from the agent's root disk,
//! `path` takes it from a path disk, `mount` consumes one whole mount whose size
//! lies in `[disk, disk_max]`. A path constraint is a prefix of the source root.
//! Monitors need one port (their configured one if set), OSDs need
//! [`OSD_PORT_COUNT`] contiguous ports.

use std::collections::BTreeMap;

use crate::deployment::{DeploymentConfig, DiskType};
use crate::model::{
    DiskSource, FRAMEWORK_ID_LABEL, Offer, Operation, Range, Reservation, Resource, Role,
    TASK_ID_LABEL, TaskId, Volume,
};

/// Contiguous ports bound by one OSD.
pub const OSD_PORT_COUNT: u64 = 5;

/// Highest valid port number.
const MAX_PORT: u64 = u16::MAX as u64;

/// Container path of a task's persistent volume.
pub const VOLUME_CONTAINER_PATH: &str = "state";

/// Port demand of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDemand {
    /// One port, optionally a specific one.
    Single(Option<u16>),
    /// A block of contiguous ports.
    Contiguous(u64),
}

/// What one task needs from an offer.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirements {
    /// CPUs.
    pub cpus: f64,
    /// Memory in MB.
    pub mem: f64,
    /// Disk in MB (minimum for mounts).
    pub disk: f64,
    /// Disk provisioning.
    pub disk_type: DiskType,
    /// Largest acceptable mount.
    pub disk_max: Option<f64>,
    /// Required prefix of the disk source root.
    pub path_constraint: Option<String>,
    /// Ports.
    pub ports: PortDemand,
}

impl Requirements {
    /// Requirements of `role` under `config`.
    pub fn for_role(role: Role, config: &DeploymentConfig) -> Self {
        match role {
            Role::Monitor => Self {
                cpus: config.mon.cpus,
                mem: config.mon.mem,
                disk: config.mon.disk,
                disk_type: config.mon.disk_type,
                disk_max: None,
                path_constraint: None,
                ports: PortDemand::Single(config.mon.port),
            },
            Role::Osd => Self {
                cpus: config.osd.cpus,
                mem: config.osd.mem,
                disk: config.osd.disk,
                disk_type: config.osd.disk_type,
                disk_max: config.osd.disk_max,
                path_constraint: config.osd.path_constraint.clone(),
                ports: PortDemand::Contiguous(OSD_PORT_COUNT),
            },
        }
    }

    fn source_allowed(&self, source: &DiskSource) -> bool {
        match &self.path_constraint {
            Some(prefix) => source.root().starts_with(prefix.as_str()),
            None => true,
        }
    }

    /// Pick ports and the primary port. Values outside the port space are
    /// never handed out.
    fn pick_ports(&self, ranges: &[Range]) -> Option<(Range, u16)> {
        let usable: Vec<Range> = ranges
            .iter()
            .filter(|r| r.begin <= MAX_PORT && r.begin <= r.end)
            .map(|r| Range::new(r.begin, r.end.min(MAX_PORT)))
            .collect();
        let picked = match self.ports {
            PortDemand::Single(Some(port)) => usable
                .iter()
                .any(|r| r.contains(u64::from(port)))
                .then(|| Range::new(u64::from(port), u64::from(port))),
            PortDemand::Single(None) => usable.first().map(|r| Range::new(r.begin, r.begin)),
            PortDemand::Contiguous(count) => usable
                .iter()
                .find(|r| r.size() >= count)
                .map(|r| Range::new(r.begin, r.begin + count - 1)),
        }?;
        let port = u16::try_from(picked.begin).ok()?;
        Some((picked, port))
    }
}

/// Resources picked from an offer for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Resources to reserve or launch with.
    pub resources: Vec<Resource>,
    /// Ports handed to the task.
    pub ports: Range,
    /// Primary port of the task, the first of `ports`.
    pub port: u16,
}

impl Allocation {
    /// Disk resource of the allocation.
    pub fn disk(&self) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == "disk")
    }

    /// Reserve and create-volume operations for an unreserved allocation.
    pub fn reserve_operations(
        &self,
        task_id: TaskId,
        framework_id: &str,
        role: &str,
        principal: &str,
    ) -> Vec<Operation> {
        let reservation = Reservation {
            principal: principal.to_string(),
            labels: reservation_labels(framework_id, task_id),
        };
        let resources: Vec<Resource> = self
            .resources
            .iter()
            .cloned()
            .map(|r| r.reserved(role, reservation.clone()))
            .collect();
        let volumes: Vec<Resource> = resources
            .iter()
            .filter(|r| r.name == "disk")
            .cloned()
            .map(|r| {
                r.with_volume(Volume {
                    id: task_id.to_string(),
                    principal: principal.to_string(),
                    container_path: VOLUME_CONTAINER_PATH.to_string(),
                })
            })
            .collect();
        vec![
            Operation::Reserve { resources },
            Operation::Create { volumes },
        ]
    }
}

/// Labels tying a reservation to `(framework_id, task_id)`.
pub fn reservation_labels(framework_id: &str, task_id: TaskId) -> BTreeMap<String, String> {
    BTreeMap::from([
        (FRAMEWORK_ID_LABEL.to_string(), framework_id.to_string()),
        (TASK_ID_LABEL.to_string(), task_id.to_string()),
    ])
}

fn scalar_total<'a>(resources: impl Iterator<Item = &'a Resource>, name: &str) -> f64 {
    resources
        .filter(|r| r.name == name)
        .filter_map(Resource::scalar_value)
        .sum()
}

/// Take what `req` needs from the unreserved resources of `offer`.
pub fn match_unreserved(offer: &Offer, req: &Requirements) -> Option<Allocation> {
    let free = || offer.resources.iter().filter(|r| r.is_unreserved());

    if scalar_total(free(), "cpus") < req.cpus || scalar_total(free(), "mem") < req.mem {
        return None;
    }

    let disk = free()
        .filter(|r| r.name == "disk")
        .find_map(|r| take_disk(r, req))?;

    let port_ranges: Vec<Range> = free()
        .filter(|r| r.name == "ports")
        .flat_map(|r| r.range_values().iter().copied())
        .collect();
    let (ports, port) = req.pick_ports(&port_ranges)?;

    Some(Allocation {
        resources: vec![
            Resource::scalar("cpus", req.cpus),
            Resource::scalar("mem", req.mem),
            disk,
            Resource::ranges("ports", vec![ports]),
        ],
        ports,
        port,
    })
}

fn take_disk(resource: &Resource, req: &Requirements) -> Option<Resource> {
    let available = resource.scalar_value()?;
    match (req.disk_type, resource.source()) {
        (DiskType::Root, None) if available >= req.disk => {
            Some(Resource::scalar("disk", req.disk))
        }
        (DiskType::Path, Some(source @ DiskSource::Path { .. }))
            if available >= req.disk && req.source_allowed(source) =>
        {
            Some(Resource::scalar("disk", req.disk).with_source(source.clone()))
        }
        (DiskType::Mount, Some(source @ DiskSource::Mount { .. }))
            if available >= req.disk
                && req.disk_max.is_none_or(|max| available <= max)
                && req.source_allowed(source) =>
        {
            Some(Resource::scalar("disk", available).with_source(source.clone()))
        }
        _ => None,
    }
}

/// Check that the resources reserved for `task_id` in `offer` still satisfy
/// `req`. The allocation holds every labelled resource, unchanged.
pub fn match_reserved(
    offer: &Offer,
    framework_id: &str,
    task_id: TaskId,
    req: &Requirements,
) -> Option<Allocation> {
    let task = task_id.to_string();
    let reserved: Vec<Resource> = offer
        .resources
        .iter()
        .filter(|r| {
            r.label(FRAMEWORK_ID_LABEL) == Some(framework_id)
                && r.label(TASK_ID_LABEL) == Some(task.as_str())
        })
        .cloned()
        .collect();

    if scalar_total(reserved.iter(), "cpus") < req.cpus
        || scalar_total(reserved.iter(), "mem") < req.mem
    {
        return None;
    }

    let volume_size = reserved
        .iter()
        .filter(|r| r.name == "disk" && r.volume().is_some_and(|v| v.id == task))
        .find_map(Resource::scalar_value)?;
    if volume_size < req.disk {
        return None;
    }

    let port_ranges: Vec<Range> = reserved
        .iter()
        .filter(|r| r.name == "ports")
        .flat_map(|r| r.range_values().iter().copied())
        .collect();
    let (ports, port) = req.pick_ports(&port_ranges)?;

    Some(Allocation {
        resources: reserved,
        ports,
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn offer(resources: Vec<Resource>) -> Offer {
        Offer {
            id: "offer-1".to_string(),
            framework_id: "fw".to_string(),
            slave_id: "slave-1".to_string(),
            hostname: "host-1".to_string(),
            ip: "10.0.0.1".to_string(),
            resources,
        }
    }

    fn base(disk: Resource) -> Vec<Resource> {
        vec![
            Resource::scalar("cpus", 4.0),
            Resource::scalar("mem", 4096.0),
            disk,
            Resource::ranges("ports", vec![Range::new(31000, 31010)]),
        ]
    }

    fn mount(size: f64, root: &str) -> Resource {
        Resource::scalar("disk", size).with_source(DiskSource::Mount {
            root: root.to_string(),
        })
    }

    fn osd_requirements() -> Requirements {
        let mut config = DeploymentConfig::default();
        config.osd.disk = 100_000.0;
        config.osd.disk_type = DiskType::Mount;
        Requirements::for_role(Role::Osd, &config)
    }

    #[test]
    fn test_monitor_takes_root_disk_and_single_port() {
        let req = Requirements::for_role(Role::Monitor, &DeploymentConfig::default());
        let alloc = match_unreserved(&offer(base(Resource::scalar("disk", 1000.0))), &req)
            .expect("monitor should fit");

        assert_eq!(alloc.ports, Range::new(31000, 31000));
        assert_eq!(alloc.disk().and_then(Resource::scalar_value), Some(16.0));
    }

    #[test]
    fn test_monitor_fixed_port() {
        let mut config = DeploymentConfig::default();
        config.mon.port = Some(31005);
        let req = Requirements::for_role(Role::Monitor, &config);
        let alloc = match_unreserved(&offer(base(Resource::scalar("disk", 1000.0))), &req)
            .expect("port 31005 is offered");
        assert_eq!(alloc.port, 31005);

        config.mon.port = Some(6789);
        let req = Requirements::for_role(Role::Monitor, &config);
        assert!(match_unreserved(&offer(base(Resource::scalar("disk", 1000.0))), &req).is_none());
    }

    #[test]
    fn test_osd_consumes_whole_mount() {
        let alloc = match_unreserved(
            &offer(base(mount(1_024_000.0, "/mnt/disk1"))),
            &osd_requirements(),
        )
        .expect("mount should fit");

        assert_eq!(alloc.ports, Range::new(31000, 31004));
        assert_eq!(
            alloc.disk().and_then(Resource::scalar_value),
            Some(1_024_000.0)
        );
    }

    #[test]
    fn test_mount_bounds_and_constraint() {
        let mut req = osd_requirements();
        assert!(match_unreserved(&offer(base(mount(50_000.0, "/mnt/a"))), &req).is_none());

        req.disk_max = Some(500_000.0);
        assert!(match_unreserved(&offer(base(mount(1_024_000.0, "/mnt/a"))), &req).is_none());

        req.disk_max = None;
        req.path_constraint = Some("/mnt/ssd".to_string());
        assert!(match_unreserved(&offer(base(mount(200_000.0, "/mnt/hdd0"))), &req).is_none());
        assert!(match_unreserved(&offer(base(mount(200_000.0, "/mnt/ssd0"))), &req).is_some());
    }

    #[test]
    fn test_osd_needs_contiguous_ports() {
        let mut resources = base(mount(200_000.0, "/mnt/a"));
        resources[3] = Resource::ranges(
            "ports",
            vec![Range::new(31000, 31002), Range::new(31100, 31101)],
        );
        assert!(match_unreserved(&offer(resources), &osd_requirements()).is_none());
    }

    #[test]
    fn test_ports_outside_the_port_space_are_never_picked() {
        let mut resources = base(Resource::scalar("disk", 1000.0));
        resources[3] = Resource::ranges("ports", vec![Range::new(70_000, 70_010)]);
        let mon = Requirements::for_role(Role::Monitor, &DeploymentConfig::default());
        assert!(match_unreserved(&offer(resources.clone()), &mon).is_none());

        resources[3] = Resource::ranges(
            "ports",
            vec![Range::new(65_534, 65_600), Range::new(70_000, 70_010)],
        );
        let alloc = match_unreserved(&offer(resources.clone()), &mon).expect("65534 is a port");
        assert_eq!(alloc.port, 65_534);

        resources[2] = mount(200_000.0, "/mnt/a");
        assert!(match_unreserved(&offer(resources), &osd_requirements()).is_none());
    }

    #[test]
    fn test_reserved_resources_are_ignored_for_new_reservations() {
        let task_id = Uuid::new_v4();
        let reservation = Reservation {
            principal: "ceph".to_string(),
            labels: reservation_labels("fw", task_id),
        };
        let resources = base(Resource::scalar("disk", 1000.0))
            .into_iter()
            .map(|r| r.reserved("ceph", reservation.clone()))
            .collect();
        let req = Requirements::for_role(Role::Monitor, &DeploymentConfig::default());
        assert!(match_unreserved(&offer(resources), &req).is_none());
    }

    #[test]
    fn test_reserve_then_confirm() {
        let task_id = Uuid::new_v4();
        let req = osd_requirements();
        let alloc = match_unreserved(&offer(base(mount(1_024_000.0, "/mnt/a"))), &req).unwrap();

        let ops = alloc.reserve_operations(task_id, "fw", "ceph", "ceph");
        let (reserved, volumes) = match ops.as_slice() {
            [
                Operation::Reserve { resources },
                Operation::Create { volumes },
            ] => (resources.clone(), volumes.clone()),
            other => panic!("unexpected operations: {:?}", other),
        };
        assert_eq!(volumes.len(), 1);
        assert_eq!(
            volumes[0].volume().map(|v| v.id.clone()),
            Some(task_id.to_string())
        );

        let confirmed: Vec<Resource> = reserved
            .into_iter()
            .filter(|r| r.name != "disk")
            .chain(volumes)
            .collect();
        let alloc = match_reserved(&offer(confirmed.clone()), "fw", task_id, &req)
            .expect("reservation should confirm");
        assert_eq!(alloc.resources, confirmed);
        assert_eq!(alloc.ports, Range::new(31000, 31004));

        assert!(match_reserved(&offer(confirmed.clone()), "other-fw", task_id, &req).is_none());
        assert!(match_reserved(&offer(confirmed), "fw", Uuid::new_v4(), &req).is_none());
    }
}
