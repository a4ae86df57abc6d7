// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock driver for testing.
//!
//! Records every call instead of talking to a cluster scheduler.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::traits::*;
use crate::model::{Operation, TaskId};

/// A recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    /// `accept_offer`
    Accept {
        /// Offer id.
        offer_id: String,
        /// Operations.
        operations: Vec<Operation>,
    },
    /// `decline_offer`
    Decline {
        /// Offer id.
        offer_id: String,
    },
    /// `kill_task`
    Kill {
        /// Task id.
        task_id: TaskId,
    },
    /// `revive_offers`
    Revive,
    /// `reconcile`
    Reconcile {
        /// Tasks asked about.
        tasks: Vec<ReconcileTask>,
    },
}

/// Mock driver for testing.
#[derive(Debug, Default)]
pub struct MockDriver {
    calls: Mutex<Vec<DriverCall>>,
    /// If true, every call is recorded and then fails.
    fail_calls: AtomicBool,
}

impl MockDriver {
    /// Create a new mock driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make later calls fail (they are still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.fail_calls.store(failing, Ordering::SeqCst);
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().clone()
    }

    /// Calls recorded so far, clearing the record.
    pub fn take_calls(&self) -> Vec<DriverCall> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DriverCall>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: DriverCall) -> DriverResult<()> {
        self.lock().push(call);
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(DriverError::Disconnected);
        }
        Ok(())
    }
}

#[async_trait]
impl SchedulerDriver for MockDriver {
    fn driver_type(&self) -> &'static str {
        "mock"
    }

    async fn accept_offer(&self, offer_id: &str, operations: Vec<Operation>) -> DriverResult<()> {
        self.record(DriverCall::Accept {
            offer_id: offer_id.to_string(),
            operations,
        })
    }

    async fn decline_offer(&self, offer_id: &str) -> DriverResult<()> {
        self.record(DriverCall::Decline {
            offer_id: offer_id.to_string(),
        })
    }

    async fn kill_task(&self, task_id: TaskId) -> DriverResult<()> {
        self.record(DriverCall::Kill { task_id })
    }

    async fn revive_offers(&self) -> DriverResult<()> {
        self.record(DriverCall::Revive)
    }

    async fn reconcile(&self, tasks: Vec<ReconcileTask>) -> DriverResult<()> {
        self.record(DriverCall::Reconcile { tasks })
    }
}
