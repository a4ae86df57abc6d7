// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for engine and runtime tests.

#![allow(dead_code)]

use std::sync::Arc;

use cephalo_kv::{KvStore, MemoryStore};
use cephalo_scheduler::deployment::{DeploymentConfig, DiskType};
use cephalo_scheduler::engine::{Behavior, Engine, EngineSettings, Event, TaskView};
use cephalo_scheduler::model::{
    DiskSource, Offer, Operation, Range, Resource, Role, TaskId, TaskInfo, TaskState, TaskStatus,
    TASK_ID_LABEL,
};
use cephalo_scheduler::stores::ConfigStore;
use cephalo_scheduler::transport::{DriverCall, MockDriver};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub const FRAMEWORK_ID: &str = "framework-1";

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Offers
// ============================================================================

pub fn slave(n: u32) -> String {
    format!("slave-{}", n)
}

pub fn host(n: u32) -> String {
    format!("host-{}", n)
}

pub fn ip(n: u32) -> String {
    format!("10.0.0.{}", 10 + n)
}

pub fn offer(id: &str, agent: u32, resources: Vec<Resource>) -> Offer {
    Offer {
        id: id.to_string(),
        framework_id: FRAMEWORK_ID.to_string(),
        slave_id: slave(agent),
        hostname: host(agent),
        ip: ip(agent),
        resources,
    }
}

/// Plenty of CPU and memory, root disk, and `ports`.
pub fn root_resources(ports: Range) -> Vec<Resource> {
    vec![
        Resource::scalar("cpus", 8.0),
        Resource::scalar("mem", 16384.0),
        Resource::scalar("disk", 64000.0),
        Resource::ranges("ports", vec![ports]),
    ]
}

/// Plenty of CPU and memory, a dedicated mount of `size` MB, and `ports`.
pub fn mount_resources(size: f64, ports: Range) -> Vec<Resource> {
    vec![
        Resource::scalar("cpus", 8.0),
        Resource::scalar("mem", 16384.0),
        Resource::scalar("disk", size).with_source(DiskSource::Mount {
            root: "/mnt/data-1".to_string(),
        }),
        Resource::ranges("ports", vec![ports]),
    ]
}

/// The offer the cluster scheduler sends back after applying reserve and
/// create operations: reserved resources, disks carrying their volumes.
pub fn confirm_offer(id: &str, agent: u32, operations: &[Operation]) -> Offer {
    let mut reserved = Vec::new();
    let mut volumes = Vec::new();
    for operation in operations {
        match operation {
            Operation::Reserve { resources } => reserved.extend(resources.iter().cloned()),
            Operation::Create { volumes: created } => volumes.extend(created.iter().cloned()),
            Operation::Launch { .. } => {}
        }
    }
    let resources = reserved
        .into_iter()
        .map(|r| {
            if r.name == "disk" {
                volumes.first().cloned().unwrap_or(r)
            } else {
                r
            }
        })
        .collect();
    offer(id, agent, resources)
}

pub fn deployment(mons: usize, osds: usize) -> DeploymentConfig {
    let mut config = DeploymentConfig::default();
    config.mon.count = mons;
    config.osd.count = osds;
    config.osd.disk_type = DiskType::Mount;
    config.osd.disk = 100_000.0;
    config
}

// ============================================================================
// Driver calls
// ============================================================================

pub fn accepts(calls: &[DriverCall]) -> Vec<(String, Vec<Operation>)> {
    calls
        .iter()
        .filter_map(|c| match c {
            DriverCall::Accept {
                offer_id,
                operations,
            } => Some((offer_id.clone(), operations.clone())),
            _ => None,
        })
        .collect()
}

pub fn declines(calls: &[DriverCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|c| match c {
            DriverCall::Decline { offer_id } => Some(offer_id.clone()),
            _ => None,
        })
        .collect()
}

pub fn kills(calls: &[DriverCall]) -> Vec<TaskId> {
    calls
        .iter()
        .filter_map(|c| match c {
            DriverCall::Kill { task_id } => Some(*task_id),
            _ => None,
        })
        .collect()
}

pub fn revives(calls: &[DriverCall]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, DriverCall::Revive))
        .count()
}

/// Task a reserve operation is labelled for.
pub fn reserved_for(operations: &[Operation]) -> TaskId {
    operations
        .iter()
        .find_map(|op| match op {
            Operation::Reserve { resources } => resources
                .iter()
                .find_map(|r| r.label(TASK_ID_LABEL))
                .and_then(|id| id.parse().ok()),
            _ => None,
        })
        .expect("no labelled reserve operation")
}

pub fn launched(operations: &[Operation]) -> &TaskInfo {
    match operations {
        [Operation::Launch { task }] => task,
        other => panic!("expected a single launch, got {:?}", other),
    }
}

// ============================================================================
// Engine harness
// ============================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub driver: Arc<MockDriver>,
    pub engine: Engine,
    pub wakes: mpsc::UnboundedReceiver<Event>,
}

impl Harness {
    pub async fn new() -> Self {
        init_tracing();
        Self::on(Arc::new(MemoryStore::new())).await
    }

    /// Engine over an existing store, as after a scheduler restart.
    pub async fn on(store: Arc<MemoryStore>) -> Self {
        let driver = Arc::new(MockDriver::new());
        let (tx, wakes) = mpsc::unbounded_channel();
        let kv: Arc<dyn KvStore> = store.clone();
        let engine = Engine::start(
            kv,
            driver.clone(),
            EngineSettings::default(),
            FRAMEWORK_ID,
            tx,
        )
        .await
        .unwrap();
        Self {
            store,
            driver,
            engine,
            wakes,
        }
    }

    pub async fn restart(self) -> Self {
        let store = self.store.clone();
        drop(self);
        Self::on(store).await
    }

    /// Handle one event and return the driver calls it caused.
    pub async fn handle(&mut self, event: Event) -> Vec<DriverCall> {
        self.engine.handle(event).await.unwrap();
        self.driver.take_calls()
    }

    pub fn kv(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    /// Store a deployment and hand it to the engine, as the config watch would.
    pub async fn configure(&mut self, mons: usize, osds: usize) -> Vec<DriverCall> {
        let config = deployment(mons, osds);
        ConfigStore::new(self.kv()).save(&config).await.unwrap();
        self.handle(Event::ConfigUpdated(config)).await
    }

    pub async fn offers(&mut self, offers: Vec<Offer>) -> Vec<DriverCall> {
        self.handle(Event::ResourceOffers(offers)).await
    }

    pub async fn status(&mut self, task_id: TaskId, state: TaskState) -> Vec<DriverCall> {
        self.handle(Event::StatusUpdate(TaskStatus::new(task_id, state)))
            .await
    }

    /// Deliver the next timer wake.
    pub async fn next_wake(&mut self) -> Vec<DriverCall> {
        let wake = self.wakes.recv().await.expect("timer channel closed");
        self.handle(wake).await
    }

    pub fn task(&self, id: TaskId) -> TaskView {
        self.engine.task(id).expect("task not found")
    }

    pub fn tasks_of(&self, role: Role) -> Vec<TaskView> {
        self.engine
            .tasks()
            .into_iter()
            .filter(|t| t.state.role == role)
            .collect()
    }

    pub fn with_behavior(&self, behavior: Behavior) -> Vec<TaskView> {
        self.engine
            .tasks()
            .into_iter()
            .filter(|t| t.behavior == behavior)
            .collect()
    }

    /// Reserve, confirm and run one task on `agent`. Returns its id and the
    /// launch operations.
    pub async fn launch_on(
        &mut self,
        agent: u32,
        resources: Vec<Resource>,
    ) -> (TaskId, Vec<Operation>) {
        let calls = self
            .offers(vec![offer(&format!("reserve-{}", agent), agent, resources)])
            .await;
        let accepted = accepts(&calls);
        assert_eq!(accepted.len(), 1, "unreserved offer not accepted: {:?}", calls);
        let reserve_ops = accepted[0].1.clone();
        let task_id = reserved_for(&reserve_ops);

        let calls = self
            .offers(vec![confirm_offer(
                &format!("confirm-{}", agent),
                agent,
                &reserve_ops,
            )])
            .await;
        let accepted = accepts(&calls);
        assert_eq!(accepted.len(), 1, "reserved offer not accepted: {:?}", calls);
        let launch_ops = accepted[0].1.clone();

        self.status(task_id, TaskState::Running).await;
        (task_id, launch_ops)
    }
}
