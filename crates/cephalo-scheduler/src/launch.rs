// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Launch command construction.
//!
//! Each daemon runs a short shell script inside the Ceph container. The
//! script unpacks the configuration bundle, initializes the daemon's data on
//! the persistent volume the first time, then execs the daemon.

use std::collections::BTreeMap;

use crate::matcher::{Allocation, VOLUME_CONTAINER_PATH};
use crate::model::{CommandInfo, ContainerInfo, Location, PersistentState, Role, TaskInfo};
use crate::render::BUNDLE_ENV;

/// How a monitor gets its initial monitor map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// First monitor of the cluster: builds the map from its own config.
    Bootstrap,
    /// Joins running monitors: fetches the map from the cluster.
    Join,
}

/// What kind of daemon to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    /// A monitor.
    Monitor(MonitorMode),
    /// An OSD.
    Osd,
}

const EXTRACT_BUNDLE: &str = "echo \"$CEPH_CONFIG_TGZ\" | base64 -d | tar xzf - -C /";

/// Shell script for a daemon reachable at `location`.
pub fn command_line(kind: LaunchKind, location: &Location) -> String {
    let host = &location.hostname;
    let addr = location.addr();
    match kind {
        LaunchKind::Monitor(mode) => {
            let monmap = match mode {
                MonitorMode::Bootstrap => format!(
                    "monmaptool --create --add {host} {addr} --fsid \"$(ceph-conf --lookup fsid)\" /tmp/monmap"
                ),
                MonitorMode::Join => "ceph mon getmap -o /tmp/monmap".to_string(),
            };
            format!(
                "set -e\n\
                 {EXTRACT_BUNDLE}\n\
                 MON_DATA={VOLUME_CONTAINER_PATH}/mon\n\
                 if [ ! -e \"$MON_DATA/done\" ]; then\n\
                 \x20 mkdir -p \"$MON_DATA\"\n\
                 \x20 {monmap}\n\
                 \x20 ceph-mon --mkfs -i {host} --mon-data \"$MON_DATA\" --monmap /tmp/monmap --keyring /etc/ceph/ceph.mon.keyring\n\
                 \x20 touch \"$MON_DATA/done\"\n\
                 fi\n\
                 exec ceph-mon -d -i {host} --mon-data \"$MON_DATA\" --public-addr {addr}\n"
            )
        }
        LaunchKind::Osd => format!(
            "set -e\n\
             {EXTRACT_BUNDLE}\n\
             OSD_DATA={VOLUME_CONTAINER_PATH}/osd\n\
             mkdir -p \"$OSD_DATA\"\n\
             if [ ! -e \"$OSD_DATA/whoami\" ]; then\n\
             \x20 OSD_ID=$(ceph osd create)\n\
             \x20 ceph-osd --mkfs --mkkey -i \"$OSD_ID\" --osd-data \"$OSD_DATA\" --osd-journal \"$OSD_DATA/journal\"\n\
             \x20 ceph auth add \"osd.$OSD_ID\" osd 'allow *' mon 'allow profile osd' -i \"$OSD_DATA/keyring\"\n\
             \x20 ceph osd crush add \"osd.$OSD_ID\" 1.0 host={host} root=default\n\
             fi\n\
             exec ceph-osd -d -i \"$(cat \"$OSD_DATA/whoami\")\" --osd-data \"$OSD_DATA\" --osd-journal \"$OSD_DATA/journal\"\n"
        ),
    }
}

/// Everything a launch operation is built from.
#[derive(Debug, Clone)]
pub struct LaunchRequest<'a> {
    /// The task being launched.
    pub state: &'a PersistentState,
    /// Daemon kind.
    pub kind: LaunchKind,
    /// Confirmed reserved resources.
    pub allocation: &'a Allocation,
    /// Agent to launch on.
    pub slave_id: &'a str,
    /// Where the daemon will listen.
    pub location: &'a Location,
    /// Container image.
    pub image: &'a str,
    /// Encoded configuration bundle.
    pub bundle: String,
}

/// Build the task description for a launch operation.
pub fn task_info(request: LaunchRequest<'_>) -> TaskInfo {
    let state = request.state;
    let name = match state.role {
        Role::Monitor => format!("{}.mon.{}", state.cluster, request.location.hostname),
        Role::Osd => format!("{}.osd.{}", state.cluster, request.location.hostname),
    };

    TaskInfo {
        task_id: state.id,
        name,
        slave_id: request.slave_id.to_string(),
        resources: request.allocation.resources.clone(),
        command: CommandInfo {
            value: command_line(request.kind, request.location),
            environment: BTreeMap::from([(BUNDLE_ENV.to_string(), request.bundle)]),
        },
        container: ContainerInfo {
            image: request.image.to_string(),
            host_network: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> Location {
        Location {
            hostname: "host-1".to_string(),
            ip: "10.0.0.11".to_string(),
            port: 6789,
        }
    }

    #[test]
    fn test_bootstrap_monitor_builds_its_own_map() {
        let cmd = command_line(LaunchKind::Monitor(MonitorMode::Bootstrap), &location());
        assert!(cmd.contains("monmaptool --create --add host-1 10.0.0.11:6789"));
        assert!(!cmd.contains("getmap"));
        assert!(cmd.contains("--public-addr 10.0.0.11:6789"));
    }

    #[test]
    fn test_joining_monitor_fetches_map() {
        let cmd = command_line(LaunchKind::Monitor(MonitorMode::Join), &location());
        assert!(cmd.contains("ceph mon getmap -o /tmp/monmap"));
        assert!(!cmd.contains("monmaptool"));
    }

    #[test]
    fn test_osd_registers_on_first_start() {
        let cmd = command_line(LaunchKind::Osd, &location());
        assert!(cmd.contains("ceph osd create"));
        assert!(cmd.contains("host=host-1"));
        assert!(cmd.starts_with("set -e\n"));
    }
}
