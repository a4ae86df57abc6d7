// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task orchestration engine.
//!
//! The engine owns every task of one cluster and reacts to one [`Event`] at
//! a time. It persists a task's state before emitting the driver call that
//! depends on it, so a restart never finds an operation the store does not
//! know about.
//!
//! | Event | Reaction |
//! |-------|----------|
//! | `ConfigUpdated` | create or remove tasks to match the counts |
//! | `ResourceOffers` | reserve for waiting tasks, launch on confirmed reservations, decline the rest |
//! | `StatusUpdate` | track running tasks, back off crashed ones, kill orphans |
//! | `UpdateGoal` | pause (kill) or resume a task |
//! | `Wake` | reservation, launch, reconcile, kill and backoff timeouts |
//!
//! After every event, idle tasks are re-evaluated against their goal and
//! dependencies, and offers are revived once if any task started waiting.

mod behavior;
mod dependency;
mod offers;
mod reactions;
mod timers;

pub use behavior::{Behavior, SleepReason};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cephalo_kv::KvStore;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::deployment::DeploymentConfig;
use crate::error::Result;
use crate::model::{Offer, PersistentState, RunState, TaskId, TaskStatus};
use crate::stores::{ClusterSecrets, ConfigStore, SecretStore, TaskStore};
use crate::transport::{ReconcileTask, SchedulerDriver};
use timers::Timers;

/// Input of the engine.
#[derive(Debug, Clone)]
pub enum Event {
    /// The operator deployment document changed.
    ConfigUpdated(DeploymentConfig),
    /// The cluster scheduler offered resources.
    ResourceOffers(Vec<Offer>),
    /// The cluster scheduler reported a task state.
    StatusUpdate(TaskStatus),
    /// The operator changed a task's goal.
    UpdateGoal {
        /// Target task.
        task_id: TaskId,
        /// New goal.
        goal: RunState,
    },
    /// A task timer fired.
    Wake {
        /// Target task.
        task_id: TaskId,
        /// Task generation the timer was scheduled in.
        generation: u64,
    },
}

/// Engine parameters.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Ceph cluster name.
    pub cluster: String,
    /// Resource role reservations are made for.
    pub role: String,
    /// Principal reservations and volumes are made by.
    pub principal: String,
    /// Daemon container image.
    pub image: String,
    /// How long a reservation may stay unconfirmed.
    pub reservation_timeout: Duration,
    /// How long a launch, kill or reconciliation waits for a status.
    pub reconcile_timeout: Duration,
    /// First crash backoff delay.
    pub backoff_base: Duration,
    /// Upper bound for crash backoff.
    pub backoff_max: Duration,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            cluster: config.cluster_name.clone(),
            role: config.role.clone(),
            principal: config.principal.clone(),
            image: config.ceph_image.clone(),
            reservation_timeout: config.reservation_timeout,
            reconcile_timeout: config.reconcile_timeout,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Read-only view of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    /// Durable state.
    pub state: PersistentState,
    /// Current behaviour.
    pub behavior: Behavior,
    /// Whether the task is being removed by a scale-in.
    pub removing: bool,
}

struct TaskEntry {
    state: PersistentState,
    behavior: Behavior,
    generation: u64,
    failures: u32,
    removing: bool,
}

impl TaskEntry {
    fn new(state: PersistentState, behavior: Behavior) -> Self {
        Self {
            state,
            behavior,
            generation: 0,
            failures: 0,
            removing: false,
        }
    }

    fn view(&self) -> TaskView {
        TaskView {
            state: self.state.clone(),
            behavior: self.behavior,
            removing: self.removing,
        }
    }
}

/// The orchestration engine of one cluster.
pub struct Engine {
    settings: EngineSettings,
    framework_id: String,
    deployment: DeploymentConfig,
    secrets: ClusterSecrets,
    tasks: HashMap<TaskId, TaskEntry>,
    task_store: TaskStore,
    driver: Arc<dyn SchedulerDriver>,
    timers: Timers,
    revive: bool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("cluster", &self.settings.cluster)
            .field("framework_id", &self.framework_id)
            .field("driver", &self.driver.driver_type())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Engine {
    /// Load the cluster from `store` and start recovering it.
    ///
    /// Tasks that may still hold a reservation are reconciled with the
    /// cluster scheduler. Timers deliver their wakes through `events`.
    pub async fn start(
        store: Arc<dyn KvStore>,
        driver: Arc<dyn SchedulerDriver>,
        settings: EngineSettings,
        framework_id: impl Into<String>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<Self> {
        let deployment = ConfigStore::new(store.clone()).ensure_default().await?;
        let secrets = SecretStore::new(store.clone()).get_or_create().await?;
        let task_store = TaskStore::new(store);
        let persisted = task_store.all().await?;

        let mut engine = Self {
            settings,
            framework_id: framework_id.into(),
            deployment: deployment.clone(),
            secrets,
            tasks: HashMap::new(),
            task_store,
            driver,
            timers: Timers::new(events),
            revive: false,
        };

        let mut reconcile = Vec::new();
        let mut idle = Vec::new();
        for state in persisted {
            if state.cluster != engine.settings.cluster {
                debug!(task_id = %state.id, cluster = %state.cluster, "Skipping task of another cluster");
                continue;
            }
            let id = state.id;
            let behavior = if state.reservation_confirmed {
                Behavior::Reconciling
            } else if state.slave_id.is_some() {
                Behavior::Reserving
            } else {
                Behavior::Sleeping(SleepReason::Dependency)
            };
            if let Some(slave_id) = &state.slave_id {
                reconcile.push(ReconcileTask {
                    task_id: id,
                    slave_id: slave_id.clone(),
                });
            }
            idle.push((state.priority(), id));
            engine.tasks.insert(id, TaskEntry::new(state, behavior));
            match behavior {
                Behavior::Reconciling => engine.schedule(id, engine.settings.reconcile_timeout),
                Behavior::Reserving => engine.schedule(id, engine.settings.reservation_timeout),
                _ => {}
            }
        }

        info!(
            cluster = %engine.settings.cluster,
            framework_id = %engine.framework_id,
            tasks = engine.tasks.len(),
            reconciling = reconcile.len(),
            "Engine starting"
        );

        if !reconcile.is_empty()
            && let Err(e) = engine.driver.reconcile(reconcile).await
        {
            warn!(error = %e, "Failed to request reconciliation");
        }

        idle.sort();
        for (_, id) in idle {
            if engine.behavior(id).is_some_and(Behavior::is_idle) {
                engine.settle(id).await?;
            }
        }

        engine.apply_deployment(deployment).await?;
        engine.refresh();
        engine.flush_revive().await;
        Ok(engine)
    }

    /// React to one event.
    ///
    /// Driver failures are logged and recovered by timers. Store failures
    /// are returned and must stop the engine.
    pub async fn handle(&mut self, event: Event) -> Result<()> {
        match event {
            Event::ConfigUpdated(config) => self.apply_deployment(config).await?,
            Event::ResourceOffers(offers) => self.resource_offers(offers).await?,
            Event::StatusUpdate(status) => self.status_update(status).await?,
            Event::UpdateGoal { task_id, goal } => self.update_goal(task_id, goal).await?,
            Event::Wake {
                task_id,
                generation,
            } => self.wake(task_id, generation).await?,
        }
        self.refresh();
        self.flush_revive().await;
        Ok(())
    }

    /// All tasks, oldest first.
    pub fn tasks(&self) -> Vec<TaskView> {
        let mut views: Vec<TaskView> = self.tasks.values().map(TaskEntry::view).collect();
        views.sort_by_key(|v| v.state.priority());
        views
    }

    /// One task.
    pub fn task(&self, id: TaskId) -> Option<TaskView> {
        self.tasks.get(&id).map(TaskEntry::view)
    }

    /// Deployment currently applied.
    pub fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    /// Framework id reservations are labelled with.
    pub fn framework_id(&self) -> &str {
        &self.framework_id
    }

    fn behavior(&self, id: TaskId) -> Option<Behavior> {
        self.tasks.get(&id).map(|e| e.behavior)
    }

    fn snapshot(&self) -> Vec<&PersistentState> {
        self.tasks.values().map(|e| &e.state).collect()
    }

    fn transition(&mut self, id: TaskId, behavior: Behavior) {
        let Some(entry) = self.tasks.get_mut(&id) else {
            return;
        };
        let previous = std::mem::replace(&mut entry.behavior, behavior);
        entry.generation += 1;
        self.timers.cancel(id);
        if previous != behavior {
            debug!(task_id = %id, from = %previous, to = %behavior, "Task transition");
            if behavior == Behavior::AwaitingOffer {
                self.revive = true;
            }
        }
    }

    fn schedule(&mut self, id: TaskId, delay: Duration) {
        if let Some(entry) = self.tasks.get(&id) {
            self.timers.schedule(id, entry.generation, delay);
        }
    }

    /// Write an updated record, then adopt it in memory.
    async fn persist(&mut self, id: TaskId, update: impl FnOnce(&mut PersistentState)) -> Result<()> {
        let Some(entry) = self.tasks.get(&id) else {
            return Ok(());
        };
        let mut state = entry.state.clone();
        update(&mut state);
        if state == entry.state {
            return Ok(());
        }
        self.task_store.save(&state).await?;
        if let Some(entry) = self.tasks.get_mut(&id) {
            entry.state = state;
        }
        Ok(())
    }

    /// Where an idle task belongs given its goal and dependencies.
    fn idle_target(&self, id: TaskId) -> Option<Behavior> {
        let entry = self.tasks.get(&id)?;
        if !entry.state.wants_running() {
            return Some(Behavior::Sleeping(SleepReason::Paused));
        }
        let all = self.snapshot();
        Some(match dependency::launch_kind(&entry.state, &all) {
            Some(_) => Behavior::AwaitingOffer,
            None => Behavior::Sleeping(SleepReason::Dependency),
        })
    }

    /// Put a task that holds no process back to rest, or finish removing it.
    async fn settle(&mut self, id: TaskId) -> Result<()> {
        let Some(entry) = self.tasks.get(&id) else {
            return Ok(());
        };
        if entry.removing {
            return self.remove(id).await;
        }
        if let Some(target) = self.idle_target(id) {
            self.transition(id, target);
        }
        Ok(())
    }

    fn refresh(&mut self) {
        let mut idle: Vec<_> = self
            .tasks
            .values()
            .filter(|e| e.behavior.is_idle() && !e.removing)
            .map(|e| (e.state.priority(), e.state.id))
            .collect();
        idle.sort();
        for (_, id) in idle {
            if let Some(target) = self.idle_target(id)
                && self.behavior(id) != Some(target)
            {
                self.transition(id, target);
            }
        }
    }

    async fn kill(&mut self, id: TaskId) {
        self.transition(id, Behavior::Killing);
        self.schedule(id, self.settings.reconcile_timeout);
        info!(task_id = %id, "Killing task");
        if let Err(e) = self.driver.kill_task(id).await {
            warn!(task_id = %id, error = %e, "Failed to kill task");
        }
    }

    async fn remove(&mut self, id: TaskId) -> Result<()> {
        self.task_store.delete(&id).await?;
        self.timers.cancel(id);
        if let Some(entry) = self.tasks.remove(&id) {
            info!(task_id = %id, role = %entry.state.role, "Task removed");
        }
        Ok(())
    }

    async fn flush_revive(&mut self) {
        if std::mem::take(&mut self.revive) {
            debug!("Reviving offers");
            if let Err(e) = self.driver.revive_offers().await {
                warn!(error = %e, "Failed to revive offers");
            }
        }
    }
}
