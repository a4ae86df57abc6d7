// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operator deployment document.
//!
//! Stored as JSON at `config.json`. Every field has a default, so operators
//! only write what they change:
//!
//! ```json
//! { "mon": { "count": 3 }, "osd": { "count": 6, "disk_type": "mount" } }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Role;

/// How a task's disk is provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskType {
    /// Space on the agent's root disk.
    #[default]
    Root,
    /// Space on a shared path disk.
    Path,
    /// A whole dedicated mount.
    Mount,
}

/// Monitor fleet shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonConfig {
    /// Desired number of monitors.
    pub count: usize,
    /// CPUs per monitor.
    pub cpus: f64,
    /// Memory per monitor in MB.
    pub mem: f64,
    /// Disk provisioning.
    pub disk_type: DiskType,
    /// Disk per monitor in MB.
    pub disk: f64,
    /// Fixed monitor port; any single port when unset.
    pub port: Option<u16>,
}

impl Default for MonConfig {
    fn default() -> Self {
        Self {
            count: 0,
            cpus: 1.0,
            mem: 256.0,
            disk_type: DiskType::Root,
            disk: 16.0,
            port: None,
        }
    }
}

/// OSD fleet shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsdConfig {
    /// Desired number of OSDs.
    pub count: usize,
    /// CPUs per OSD.
    pub cpus: f64,
    /// Memory per OSD in MB.
    pub mem: f64,
    /// Disk provisioning.
    pub disk_type: DiskType,
    /// Minimum disk per OSD in MB.
    pub disk: f64,
    /// Largest mount an OSD will take whole.
    pub disk_max: Option<f64>,
    /// Required prefix of the disk source root.
    pub path_constraint: Option<String>,
}

impl Default for OsdConfig {
    fn default() -> Self {
        Self {
            count: 0,
            cpus: 1.0,
            mem: 1024.0,
            disk_type: DiskType::Mount,
            disk: 16000.0,
            disk_max: None,
            path_constraint: None,
        }
    }
}

/// Ceph settings rendered into `ceph.conf`, one map per section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CephSettings {
    /// Authentication keys of `[global]`.
    pub auth: BTreeMap<String, String>,
    /// Other `[global]` keys.
    pub global: BTreeMap<String, String>,
    /// `[mon]` keys.
    pub mon: BTreeMap<String, String>,
    /// `[osd]` keys.
    pub osd: BTreeMap<String, String>,
    /// `[client]` keys.
    pub client: BTreeMap<String, String>,
}

fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for CephSettings {
    fn default() -> Self {
        Self {
            auth: entries(&[
                ("auth cluster required", "cephx"),
                ("auth service required", "cephx"),
                ("auth client required", "cephx"),
                ("cephx require signatures", "false"),
            ]),
            global: entries(&[
                ("osd pool default size", "3"),
                ("osd pool default min size", "1"),
                ("osd crush chooseleaf type", "1"),
            ]),
            mon: BTreeMap::new(),
            osd: entries(&[
                ("osd journal size", "100"),
                ("osd max object name len", "256"),
                ("osd max object namespace len", "64"),
            ]),
            client: entries(&[("rbd cache", "true")]),
        }
    }
}

/// Desired deployment shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Monitors.
    pub mon: MonConfig,
    /// OSDs.
    pub osd: OsdConfig,
    /// Ceph settings.
    pub settings: CephSettings,
}

impl DeploymentConfig {
    /// Parse and validate a stored document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Desired task count for `role`.
    pub fn count(&self, role: Role) -> usize {
        match role {
            Role::Monitor => self.mon.count,
            Role::Osd => self.osd.count,
        }
    }

    /// Reject shapes no offer could ever satisfy.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("mon.cpus", self.mon.cpus),
            ("mon.mem", self.mon.mem),
            ("mon.disk", self.mon.disk),
            ("osd.cpus", self.osd.cpus),
            ("osd.mem", self.osd.mem),
            ("osd.disk", self.osd.disk),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidDeployment(format!(
                    "{} must be positive, got {}",
                    field, value
                )));
            }
        }

        if let Some(max) = self.osd.disk_max
            && max < self.osd.disk
        {
            return Err(Error::InvalidDeployment(format!(
                "osd.disk_max ({}) is below osd.disk ({})",
                max, self.osd.disk
            )));
        }

        if self.mon.port == Some(0) {
            return Err(Error::InvalidDeployment(
                "mon.port must not be 0".to_string(),
            ));
        }

        Ok(())
    }
}
