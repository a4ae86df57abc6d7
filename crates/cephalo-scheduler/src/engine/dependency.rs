// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Launch dependencies between roles.
//!
//! | Task | May launch when | Mode |
//! |------|-----------------|------|
//! | monitor | another monitor is live | join |
//! | monitor | it was launched before | bootstrap |
//! | monitor | no monitor ever launched and it is the oldest wanting to run | bootstrap |
//! | OSD | any monitor is live | - |

use crate::launch::{LaunchKind, MonitorMode};
use crate::model::{Location, PersistentState, Role};

/// How `task` may launch right now, or `None` while it is blocked.
pub(crate) fn launch_kind(task: &PersistentState, all: &[&PersistentState]) -> Option<LaunchKind> {
    let mut monitors = all.iter().filter(|t| t.role == Role::Monitor);
    match task.role {
        Role::Osd => monitors.any(|m| m.is_live()).then_some(LaunchKind::Osd),
        Role::Monitor => {
            if monitors.clone().any(|m| m.id != task.id && m.is_live()) {
                return Some(LaunchKind::Monitor(MonitorMode::Join));
            }
            if task.last_launched.is_some() {
                return Some(LaunchKind::Monitor(MonitorMode::Bootstrap));
            }
            if monitors.clone().any(|m| m.last_launched.is_some()) {
                return None;
            }
            let first = monitors
                .filter(|m| m.wants_running())
                .min_by_key(|m| m.priority())?;
            (first.id == task.id).then_some(LaunchKind::Monitor(MonitorMode::Bootstrap))
        }
    }
}

/// Monitors rendered into the configuration of a daemon launching as `kind`.
///
/// Joining monitors and OSDs see every live monitor; a joining monitor is
/// listed last. A bootstrapping monitor only knows itself.
pub(crate) fn monitor_view(
    task: &PersistentState,
    kind: LaunchKind,
    location: &Location,
    all: &[&PersistentState],
) -> Vec<Location> {
    let mut live: Vec<&PersistentState> = all
        .iter()
        .copied()
        .filter(|t| t.role == Role::Monitor && t.id != task.id && t.is_live())
        .collect();
    live.sort_by_key(|t| t.priority());

    match kind {
        LaunchKind::Monitor(MonitorMode::Bootstrap) => vec![location.clone()],
        LaunchKind::Monitor(MonitorMode::Join) => live
            .iter()
            .filter_map(|t| t.location.clone())
            .chain(std::iter::once(location.clone()))
            .collect(),
        LaunchKind::Osd => live.iter().filter_map(|t| t.location.clone()).collect(),
    }
}
