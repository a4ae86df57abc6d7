// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable scheduler runtime.
//!
//! [`SchedulerRuntime`] runs one [`Engine`] on its own task, feeds it the
//! deployment document as it changes, and stops it the moment the store
//! crashes.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cephalo_scheduler::config::Config;
//! use cephalo_scheduler::runtime::SchedulerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = config.open_store().await?;
//!
//!     let runtime = SchedulerRuntime::builder()
//!         .store(store)
//!         .driver(Arc::new(my_driver))
//!         .config(config)
//!         .framework_id("20250101-000000-1-0000")
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let handle = runtime.handle();
//!     // ... forward offers and status updates through the handle ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use cephalo_kv::{CrashingKvStore, KvError, KvStore, Latch};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::engine::{Engine, EngineSettings, Event, TaskView};
use crate::error::Error;
use crate::model::{Offer, RunState, TaskId, TaskStatus};
use crate::stores::{ConfigStore, ConfigWatch, FrameworkIdStore};
use crate::transport::SchedulerDriver;

/// Builder for creating a [`SchedulerRuntime`].
pub struct SchedulerRuntimeBuilder {
    store: Option<CrashingKvStore>,
    driver: Option<Arc<dyn SchedulerDriver>>,
    config: Config,
    framework_id: Option<String>,
}

impl std::fmt::Debug for SchedulerRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerRuntimeBuilder")
            .field("store", &self.store)
            .field("driver", &self.driver.as_ref().map(|d| d.driver_type()))
            .field("cluster", &self.config.cluster_name)
            .field("framework_id", &self.framework_id)
            .finish()
    }
}

impl Default for SchedulerRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            driver: None,
            config: Config::default(),
            framework_id: None,
        }
    }
}

impl SchedulerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store (required).
    pub fn store(mut self, store: CrashingKvStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the cluster scheduler driver (required).
    pub fn driver(mut self, driver: Arc<dyn SchedulerDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the configuration.
    ///
    /// Default: [`Config::default`]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the framework id granted by the cluster scheduler.
    ///
    /// When unset, the id persisted by a previous run is used.
    pub fn framework_id(mut self, framework_id: impl Into<String>) -> Self {
        self.framework_id = Some(framework_id.into());
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<SchedulerRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let driver = self
            .driver
            .ok_or_else(|| anyhow::anyhow!("driver is required"))?;

        Ok(SchedulerRuntimeConfig {
            store,
            driver,
            config: self.config,
            framework_id: self.framework_id,
        })
    }
}

/// Configuration for a [`SchedulerRuntime`].
pub struct SchedulerRuntimeConfig {
    store: CrashingKvStore,
    driver: Arc<dyn SchedulerDriver>,
    config: Config,
    framework_id: Option<String>,
}

impl std::fmt::Debug for SchedulerRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerRuntimeConfig")
            .field("store", &self.store)
            .field("driver", &self.driver.driver_type())
            .field("cluster", &self.config.cluster_name)
            .field("framework_id", &self.framework_id)
            .finish()
    }
}

impl SchedulerRuntimeConfig {
    /// Recover the engine and start its loop.
    pub async fn start(self) -> Result<SchedulerRuntime> {
        let store: Arc<dyn KvStore> = Arc::new(self.store.clone());

        let framework_ids = FrameworkIdStore::new(store.clone());
        let framework_id = match self.framework_id {
            Some(id) => {
                framework_ids.set(&id).await?;
                id
            }
            None => framework_ids
                .get()
                .await?
                .ok_or_else(|| anyhow::anyhow!("framework id is required on first start"))?,
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = Engine::start(
            store.clone(),
            self.driver,
            EngineSettings::from(&self.config),
            framework_id.clone(),
            events_tx.clone(),
        )
        .await?;

        let config_watch = ConfigStore::new(store)
            .with_buffer(self.config.watch_buffer)
            .watch()
            .await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tasks_tx, tasks_rx) = watch::channel(engine.tasks());

        let forwarder_handle = tokio::spawn(forward_config(
            config_watch,
            events_tx.clone(),
            shutdown_rx.clone(),
        ));
        let engine_handle = tokio::spawn(run_engine(
            engine,
            events_rx,
            self.store.crashed().clone(),
            tasks_tx,
            shutdown_rx,
        ));

        info!(
            cluster = %self.config.cluster_name,
            framework_id = %framework_id,
            "SchedulerRuntime started"
        );

        Ok(SchedulerRuntime {
            engine_handle,
            forwarder_handle,
            shutdown_tx,
            handle: EngineHandle {
                events: events_tx,
                tasks: tasks_rx,
            },
        })
    }
}

/// Sends events to a running engine and observes its tasks.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    events: mpsc::UnboundedSender<Event>,
    tasks: watch::Receiver<Vec<TaskView>>,
}

impl EngineHandle {
    /// Queue an event.
    pub fn send(&self, event: Event) -> crate::error::Result<()> {
        self.events.send(event).map_err(|_| Error::EngineStopped)
    }

    /// Forward offered resources.
    pub fn resource_offers(&self, offers: Vec<Offer>) -> crate::error::Result<()> {
        self.send(Event::ResourceOffers(offers))
    }

    /// Forward a task status.
    pub fn status_update(&self, status: TaskStatus) -> crate::error::Result<()> {
        self.send(Event::StatusUpdate(status))
    }

    /// Change a task's goal.
    pub fn update_goal(&self, task_id: TaskId, goal: RunState) -> crate::error::Result<()> {
        self.send(Event::UpdateGoal { task_id, goal })
    }

    /// Tasks as of the last handled event.
    pub fn tasks(&self) -> Vec<TaskView> {
        self.tasks.borrow().clone()
    }

    /// Wait until the published tasks satisfy `predicate`.
    pub async fn wait_for_tasks(
        &self,
        mut predicate: impl FnMut(&[TaskView]) -> bool,
    ) -> crate::error::Result<Vec<TaskView>> {
        let mut rx = self.tasks.clone();
        let tasks = rx
            .wait_for(|tasks| predicate(tasks))
            .await
            .map_err(|_| Error::EngineStopped)?;
        Ok(tasks.clone())
    }
}

/// A running scheduler.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination, or
/// [`join`](Self::join) to wait for the engine to stop on its own.
pub struct SchedulerRuntime {
    engine_handle: JoinHandle<crate::error::Result<()>>,
    forwarder_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    handle: EngineHandle,
}

impl std::fmt::Debug for SchedulerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerRuntime")
            .field("running", &self.is_running())
            .finish()
    }
}

impl SchedulerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> SchedulerRuntimeBuilder {
        SchedulerRuntimeBuilder::new()
    }

    /// Handle for sending events to the engine.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Check if the engine loop is still running.
    pub fn is_running(&self) -> bool {
        !self.engine_handle.is_finished()
    }

    /// Wait for the engine loop to end without asking it to.
    pub async fn join(self) -> crate::error::Result<()> {
        let outcome = self
            .engine_handle
            .await
            .unwrap_or(Err(Error::EngineStopped));
        let _ = self.shutdown_tx.send(true);
        let _ = self.forwarder_handle.await;
        outcome
    }

    /// Gracefully shut down the runtime.
    pub async fn shutdown(self) -> Result<()> {
        info!("SchedulerRuntime shutting down...");

        let _ = self.shutdown_tx.send(true);
        let _ = self.forwarder_handle.await;

        match self.engine_handle.await {
            Ok(Ok(())) => {
                info!("SchedulerRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("SchedulerRuntime engine error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("SchedulerRuntime engine task panicked: {}", e);
                Err(anyhow::anyhow!("engine task panicked: {}", e))
            }
        }
    }
}

/// Turn deployment documents into engine events.
async fn forward_config(
    mut config_watch: ConfigWatch,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => break,

            next = config_watch.next() => match next {
                Some(config) => {
                    debug!("Deployment config changed");
                    if events.send(Event::ConfigUpdated(config)).is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    debug!("Config forwarder stopped");
}

/// Run the engine until shutdown, a store crash or a failed event.
async fn run_engine(
    mut engine: Engine,
    mut events: mpsc::UnboundedReceiver<Event>,
    crashed: Latch,
    tasks: watch::Sender<Vec<TaskView>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> crate::error::Result<()> {
    info!("Engine loop starting");

    let outcome = loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Engine loop received shutdown signal");
                    break Ok(());
                }
            }

            crash = crashed.wait() => {
                let cause = crash.err().unwrap_or(KvError::SessionExpired);
                error!(error = %cause, "Store crashed, stopping engine");
                break Err(Error::Fatal { cause });
            }

            event = events.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                if let Err(e) = engine.handle(event).await {
                    error!(error = %e, "Engine stopped on error");
                    break Err(match e {
                        Error::Kv(cause) => Error::Fatal { cause: cause.root_cause().clone() },
                        other => other,
                    });
                }
                tasks.send_replace(engine.tasks());
            }
        }
    };

    info!("Engine loop stopped");
    outcome
}
