// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Driver trait definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Operation, TaskId};

/// Errors from driver calls.
///
/// The engine logs these and relies on timers and reconciliation to recover;
/// they never stop it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// The driver is not connected to the cluster scheduler.
    #[error("Driver disconnected")]
    Disconnected,

    /// The cluster scheduler rejected the call.
    #[error("Call rejected: {0}")]
    Rejected(String),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// A task whose state the cluster scheduler should report again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReconcileTask {
    /// Task id.
    pub task_id: TaskId,
    /// Agent last known to hold the task.
    pub slave_id: String,
}

/// Outbound calls to the cluster scheduler.
#[async_trait]
pub trait SchedulerDriver: Send + Sync {
    /// Driver identifier (e.g., "mock").
    fn driver_type(&self) -> &'static str;

    /// Accept an offer, applying `operations` in order.
    async fn accept_offer(&self, offer_id: &str, operations: Vec<Operation>) -> DriverResult<()>;

    /// Decline an offer.
    async fn decline_offer(&self, offer_id: &str) -> DriverResult<()>;

    /// Kill a task.
    async fn kill_task(&self, task_id: TaskId) -> DriverResult<()>;

    /// Ask for offers to be resent promptly.
    async fn revive_offers(&self) -> DriverResult<()>;

    /// Ask for the current status of `tasks`.
    async fn reconcile(&self, tasks: Vec<ReconcileTask>) -> DriverResult<()>;
}
