// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Offer handling: two-phase reserve then launch.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::{Behavior, Engine, SleepReason, dependency};
use crate::error::Result;
use crate::launch::{self, LaunchKind, LaunchRequest};
use crate::matcher::{Requirements, match_reserved, match_unreserved};
use crate::model::{Location, Offer, Operation, Role, TaskId};
use crate::render::{self, RenderContext};

impl Engine {
    /// Answer every offer of a batch, in order. Each task matches at most
    /// one offer per batch and each offer serves at most one task.
    ///
    /// Reservations in an offer are tried oldest task first. When none of
    /// them leads to a launch, the offer's unreserved resources are matched
    /// against waiting tasks.
    pub(super) async fn resource_offers(&mut self, offers: Vec<Offer>) -> Result<()> {
        let mut matched = HashSet::new();
        for offer in offers {
            let mut labelled = offer.reservation_labels();
            labelled.sort_by_cached_key(|(_, task)| {
                let priority = task
                    .parse::<TaskId>()
                    .ok()
                    .and_then(|id| self.tasks.get(&id))
                    .map(|e| e.state.priority());
                (priority.is_none(), priority)
            });

            let mut operations = None;
            for (framework_id, task_id) in labelled {
                operations = self
                    .reserved_offer(&offer, framework_id, task_id, &mut matched)
                    .await?;
                if operations.is_some() {
                    break;
                }
            }
            if operations.is_none() {
                operations = self.unreserved_offer(&offer, &mut matched).await?;
            }

            match operations {
                Some(operations) => {
                    if let Err(e) = self.driver.accept_offer(&offer.id, operations).await {
                        warn!(offer_id = %offer.id, error = %e, "Failed to accept offer");
                    }
                }
                None => {
                    debug!(offer_id = %offer.id, slave_id = %offer.slave_id, "Declining offer");
                    if let Err(e) = self.driver.decline_offer(&offer.id).await {
                        warn!(offer_id = %offer.id, error = %e, "Failed to decline offer");
                    }
                }
            }
        }
        Ok(())
    }

    async fn reserved_offer(
        &mut self,
        offer: &Offer,
        framework_id: &str,
        task: &str,
        matched: &mut HashSet<TaskId>,
    ) -> Result<Option<Vec<Operation>>> {
        if framework_id != self.framework_id {
            warn!(offer_id = %offer.id, framework_id, "Offer reserved by another framework");
            return Ok(None);
        }
        let Ok(id) = task.parse::<TaskId>() else {
            warn!(offer_id = %offer.id, task, "Offer reserved for a malformed task id");
            return Ok(None);
        };
        let Some(entry) = self.tasks.get(&id) else {
            debug!(offer_id = %offer.id, task_id = %id, "Offer reserved for an unknown or removed task");
            return Ok(None);
        };
        if matched.contains(&id) {
            return Ok(None);
        }

        let relaunch = entry.behavior == Behavior::AwaitingOffer && entry.state.reservation_confirmed;
        if entry.behavior != Behavior::Reserving && !relaunch {
            debug!(offer_id = %offer.id, task_id = %id, behavior = %entry.behavior, "Reserved offer not needed");
            return Ok(None);
        }
        if entry.state.slave_id.as_deref() != Some(offer.slave_id.as_str()) {
            warn!(
                offer_id = %offer.id,
                task_id = %id,
                slave_id = %offer.slave_id,
                "Reserved offer from an unexpected agent"
            );
            return Ok(None);
        }

        let req = Requirements::for_role(entry.state.role, &self.deployment);
        let Some(allocation) = match_reserved(offer, framework_id, id, &req) else {
            warn!(offer_id = %offer.id, task_id = %id, "Reserved resources no longer satisfy the task");
            return Ok(None);
        };
        matched.insert(id);

        let location = Location {
            hostname: offer.hostname.clone(),
            ip: offer.ip.clone(),
            port: allocation.port,
        };
        let confirmed = location.clone();
        self.persist(id, move |s| {
            s.reservation_confirmed = true;
            s.location = Some(confirmed);
        })
        .await?;

        let Some(entry) = self.tasks.get(&id) else {
            return Ok(None);
        };
        if entry.removing || !entry.state.wants_running() {
            info!(task_id = %id, "Reservation confirmed for a task that should not run");
            self.settle(id).await?;
            return Ok(None);
        }

        let all = self.snapshot();
        let Some(kind) = dependency::launch_kind(&entry.state, &all) else {
            info!(task_id = %id, "Reservation confirmed, waiting for dependencies");
            self.transition(id, Behavior::Sleeping(SleepReason::Dependency));
            return Ok(None);
        };
        let monitors = dependency::monitor_view(&entry.state, kind, &location, &all);
        let bundle = render::build_bundle(&RenderContext {
            secrets: &self.secrets,
            settings: &self.deployment.settings,
            monitors: &monitors,
            osd_ports: matches!(kind, LaunchKind::Osd).then_some(allocation.ports),
        })?;
        let task = launch::task_info(LaunchRequest {
            state: &entry.state,
            kind,
            allocation: &allocation,
            slave_id: &offer.slave_id,
            location: &location,
            image: &self.settings.image,
            bundle,
        });

        info!(
            task_id = %id,
            role = %entry.state.role,
            host = %location.hostname,
            addr = %location.addr(),
            kind = ?kind,
            relaunch,
            "Launching task"
        );
        self.transition(id, Behavior::Launching);
        let timeout = self.settings.reconcile_timeout;
        self.schedule(id, timeout);
        Ok(Some(vec![Operation::Launch { task }]))
    }

    async fn unreserved_offer(
        &mut self,
        offer: &Offer,
        matched: &mut HashSet<TaskId>,
    ) -> Result<Option<Vec<Operation>>> {
        let mut candidates: Vec<_> = self
            .tasks
            .values()
            .filter(|e| {
                e.behavior == Behavior::AwaitingOffer
                    && !e.state.reservation_confirmed
                    && !matched.contains(&e.state.id)
            })
            .map(|e| (e.state.priority(), e.state.id, e.state.role))
            .collect();
        candidates.sort();

        for (_, id, role) in candidates {
            if role == Role::Monitor && self.hosts_monitor(&offer.slave_id, id) {
                continue;
            }
            let req = Requirements::for_role(role, &self.deployment);
            let Some(allocation) = match_unreserved(offer, &req) else {
                continue;
            };
            matched.insert(id);

            let slave_id = offer.slave_id.clone();
            self.persist(id, move |s| {
                s.slave_id = Some(slave_id);
                s.reservation_confirmed = false;
            })
            .await?;

            info!(
                offer_id = %offer.id,
                task_id = %id,
                role = %role,
                host = %offer.hostname,
                "Reserving resources"
            );
            self.transition(id, Behavior::Reserving);
            let timeout = self.settings.reservation_timeout;
            self.schedule(id, timeout);
            return Ok(Some(allocation.reserve_operations(
                id,
                &self.framework_id,
                &self.settings.role,
                &self.settings.principal,
            )));
        }
        Ok(None)
    }

    /// Whether a monitor other than `except` holds a reservation on the agent.
    fn hosts_monitor(&self, slave_id: &str, except: TaskId) -> bool {
        self.tasks.values().any(|e| {
            e.state.role == Role::Monitor
                && e.state.id != except
                && e.state.slave_id.as_deref() == Some(slave_id)
        })
    }
}
