// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reactions to deployment changes, status updates, goals and timers.

use chrono::Utc;
use tracing::{debug, info, trace, warn};

use super::timers::backoff;
use super::{Behavior, Engine, SleepReason, TaskEntry};
use crate::deployment::DeploymentConfig;
use crate::error::Result;
use crate::model::{PersistentState, Role, RunState, TaskId, TaskState, TaskStatus};
use crate::transport::ReconcileTask;

impl Engine {
    /// Create or remove tasks until each role matches its desired count.
    /// Scale-in removes the newest tasks first.
    pub(super) async fn apply_deployment(&mut self, config: DeploymentConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Ignoring invalid deployment");
            return Ok(());
        }
        self.deployment = config;

        // Creation order is matching and bootstrap order, keep it strict.
        let now = Utc::now();
        let mut stamp = match self.tasks.values().map(|e| e.state.created_at).max() {
            Some(newest) if newest >= now => newest + chrono::Duration::microseconds(1),
            _ => now,
        };

        for role in [Role::Monitor, Role::Osd] {
            let mut active: Vec<_> = self
                .tasks
                .values()
                .filter(|e| e.state.role == role && !e.removing)
                .map(|e| (e.state.priority(), e.state.id))
                .collect();
            active.sort();
            let desired = self.deployment.count(role);

            if active.len() < desired {
                info!(role = %role, current = active.len(), desired, "Scaling out");
                for _ in active.len()..desired {
                    let mut state = PersistentState::new(self.settings.cluster.clone(), role);
                    state.created_at = stamp;
                    stamp += chrono::Duration::microseconds(1);
                    self.task_store.save(&state).await?;

                    let id = state.id;
                    info!(task_id = %id, role = %role, "Task created");
                    self.tasks.insert(
                        id,
                        TaskEntry::new(state, Behavior::Sleeping(SleepReason::Dependency)),
                    );
                    self.settle(id).await?;
                }
            } else if active.len() > desired {
                info!(role = %role, current = active.len(), desired, "Scaling in");
                for (_, id) in active.into_iter().skip(desired).rev() {
                    self.scale_in(id).await?;
                }
            }
        }
        Ok(())
    }

    async fn scale_in(&mut self, id: TaskId) -> Result<()> {
        let Some(entry) = self.tasks.get_mut(&id) else {
            return Ok(());
        };
        entry.removing = true;
        let behavior = entry.behavior;
        debug!(task_id = %id, behavior = %behavior, "Removing task");

        self.persist(id, |s| s.goal = Some(RunState::Paused)).await?;
        match behavior {
            Behavior::Running | Behavior::Launching | Behavior::Reconciling => self.kill(id).await,
            Behavior::Killing => {}
            _ => self.remove(id).await?,
        }
        Ok(())
    }

    pub(super) async fn status_update(&mut self, status: TaskStatus) -> Result<()> {
        let id = status.task_id;
        let Some(entry) = self.tasks.get(&id) else {
            if status.state.is_terminal() {
                debug!(task_id = %id, state = ?status.state, "Status for unknown task");
            } else {
                warn!(task_id = %id, state = ?status.state, "Killing orphaned task");
                if let Err(e) = self.driver.kill_task(id).await {
                    warn!(task_id = %id, error = %e, "Failed to kill task");
                }
            }
            return Ok(());
        };
        let behavior = entry.behavior;
        debug!(task_id = %id, state = ?status.state, behavior = %behavior, "Status update");

        if status.state.is_terminal() {
            self.on_terminal(id, behavior, &status).await
        } else {
            self.on_active(id, behavior, &status).await
        }
    }

    async fn on_active(&mut self, id: TaskId, behavior: Behavior, status: &TaskStatus) -> Result<()> {
        let running = status.state == TaskState::Running;
        match behavior {
            Behavior::Launching | Behavior::Reconciling | Behavior::Running => {
                if running {
                    self.mark_running(id).await?;
                } else if behavior == Behavior::Reconciling {
                    self.transition(id, Behavior::Launching);
                    let timeout = self.settings.reconcile_timeout;
                    self.schedule(id, timeout);
                }
            }
            Behavior::Killing => {}
            Behavior::Sleeping(_) | Behavior::AwaitingOffer | Behavior::Reserving => {
                let adoptable = self.tasks.get(&id).is_some_and(|e| {
                    e.state.reservation_confirmed
                        && status
                            .slave_id
                            .as_ref()
                            .is_none_or(|s| e.state.slave_id.as_ref() == Some(s))
                });
                if !adoptable {
                    warn!(task_id = %id, behavior = %behavior, "Killing task running without a confirmed reservation");
                    if let Err(e) = self.driver.kill_task(id).await {
                        warn!(task_id = %id, error = %e, "Failed to kill task");
                    }
                } else if running {
                    info!(task_id = %id, "Adopting running task");
                    self.mark_running(id).await?;
                } else {
                    self.transition(id, Behavior::Launching);
                    let timeout = self.settings.reconcile_timeout;
                    self.schedule(id, timeout);
                }
            }
        }
        Ok(())
    }

    async fn mark_running(&mut self, id: TaskId) -> Result<()> {
        self.persist(id, |s| s.last_launched = Some(RunState::Running))
            .await?;
        let Some(entry) = self.tasks.get_mut(&id) else {
            return Ok(());
        };
        entry.failures = 0;
        let unwanted = entry.removing || !entry.state.wants_running();
        if entry.behavior != Behavior::Running {
            info!(task_id = %id, role = %entry.state.role, "Task running");
        }
        self.transition(id, Behavior::Running);
        if unwanted {
            self.kill(id).await;
        }
        Ok(())
    }

    async fn mark_stopped(&mut self, id: TaskId) -> Result<()> {
        self.persist(id, |s| {
            if s.last_launched == Some(RunState::Running) {
                s.last_launched = Some(RunState::Paused);
            }
        })
        .await
    }

    async fn on_terminal(&mut self, id: TaskId, behavior: Behavior, status: &TaskStatus) -> Result<()> {
        match behavior {
            Behavior::Killing | Behavior::Reconciling => {
                info!(task_id = %id, state = ?status.state, "Task stopped");
                self.mark_stopped(id).await?;
                self.settle(id).await
            }
            Behavior::Launching | Behavior::Running => {
                self.mark_stopped(id).await?;
                let Some(entry) = self.tasks.get_mut(&id) else {
                    return Ok(());
                };
                if entry.removing || !entry.state.wants_running() {
                    return self.settle(id).await;
                }
                entry.failures += 1;
                let failures = entry.failures;
                let delay = backoff(failures, self.settings.backoff_base, self.settings.backoff_max);
                warn!(
                    task_id = %id,
                    state = ?status.state,
                    message = status.message.as_deref().unwrap_or(""),
                    failures,
                    delay_secs = delay.as_secs(),
                    "Task failed, backing off"
                );
                self.transition(id, Behavior::Sleeping(SleepReason::Backoff));
                self.schedule(id, delay);
                Ok(())
            }
            _ => {
                debug!(task_id = %id, behavior = %behavior, "Ignoring terminal status");
                Ok(())
            }
        }
    }

    pub(super) async fn update_goal(&mut self, id: TaskId, goal: RunState) -> Result<()> {
        let Some(entry) = self.tasks.get(&id) else {
            warn!(task_id = %id, "Goal update for unknown task");
            return Ok(());
        };
        if entry.removing {
            debug!(task_id = %id, "Ignoring goal of a task being removed");
            return Ok(());
        }
        let behavior = entry.behavior;
        info!(task_id = %id, goal = ?goal, behavior = %behavior, "Goal updated");

        self.persist(id, |s| s.goal = Some(goal)).await?;
        match (goal, behavior) {
            (RunState::Paused, Behavior::Running | Behavior::Launching | Behavior::Reconciling) => {
                self.kill(id).await
            }
            (RunState::Paused, Behavior::Sleeping(SleepReason::Backoff)) => {
                self.transition(id, Behavior::Sleeping(SleepReason::Paused))
            }
            (_, Behavior::AwaitingOffer)
            | (_, Behavior::Sleeping(SleepReason::Dependency | SleepReason::Paused)) => {
                self.settle(id).await?
            }
            _ => {}
        }
        Ok(())
    }

    pub(super) async fn wake(&mut self, id: TaskId, generation: u64) -> Result<()> {
        let Some(entry) = self.tasks.get(&id) else {
            return Ok(());
        };
        if entry.generation != generation {
            trace!(task_id = %id, generation, current = entry.generation, "Stale wake");
            return Ok(());
        }

        let behavior = entry.behavior;
        match behavior {
            Behavior::Reserving => {
                warn!(task_id = %id, "Reservation not confirmed in time");
                self.persist(id, |s| {
                    s.slave_id = None;
                    s.reservation_confirmed = false;
                    s.location = None;
                })
                .await?;
                self.settle(id).await?;
            }
            Behavior::Reconciling => {
                warn!(task_id = %id, "No status after reconciliation, treating task as stopped");
                self.mark_stopped(id).await?;
                self.settle(id).await?;
            }
            Behavior::Launching => {
                warn!(task_id = %id, "Launch not confirmed in time, reconciling");
                if let Some(slave_id) = entry.state.slave_id.clone()
                    && let Err(e) = self
                        .driver
                        .reconcile(vec![ReconcileTask { task_id: id, slave_id }])
                        .await
                {
                    warn!(task_id = %id, error = %e, "Failed to request reconciliation");
                }
                self.transition(id, Behavior::Reconciling);
                let timeout = self.settings.reconcile_timeout;
                self.schedule(id, timeout);
            }
            Behavior::Killing => {
                debug!(task_id = %id, "Kill not confirmed, retrying");
                self.kill(id).await;
            }
            Behavior::Sleeping(SleepReason::Backoff) => self.settle(id).await?,
            _ => {}
        }
        Ok(())
    }
}
