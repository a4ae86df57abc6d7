// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistent task records.

use std::sync::Arc;

use cephalo_kv::KvStore;
use tracing::debug;

use super::{decode, encode};
use crate::error::{Error, Result};
use crate::model::{PersistentState, TaskId};

/// KV subtree holding one record per task.
pub const TASKS_PATH: &str = "tasks";

fn task_path(id: &TaskId) -> String {
    format!("{}/{}", TASKS_PATH, id)
}

/// Stores [`PersistentState`] records under `tasks/<id>`.
#[derive(Clone)]
pub struct TaskStore {
    store: Arc<dyn KvStore>,
}

impl TaskStore {
    /// Store over `store`.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Every stored task.
    ///
    /// Records deleted between listing and reading are skipped.
    pub async fn all(&self) -> Result<Vec<PersistentState>> {
        let paths: Vec<String> = self
            .store
            .children(TASKS_PATH)
            .await?
            .into_iter()
            .map(|name| format!("{}/{}", TASKS_PATH, name))
            .collect();

        let values = self.store.get_all(&paths).await?;

        let mut tasks = Vec::with_capacity(values.len());
        for (path, value) in paths.iter().zip(values) {
            if let Some(bytes) = value {
                tasks.push(decode(path, &bytes)?);
            }
        }
        Ok(tasks)
    }

    /// One task, if stored.
    pub async fn get(&self, id: &TaskId) -> Result<Option<PersistentState>> {
        let path = task_path(id);
        match self.store.get(&path).await? {
            Some(bytes) => Ok(Some(decode(&path, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a task record.
    ///
    /// Records that break the confirmed-reservation invariant are refused
    /// before anything is written.
    pub async fn save(&self, state: &PersistentState) -> Result<()> {
        state
            .validate()
            .map_err(|reason| Error::InvariantViolation {
                task_id: state.id,
                reason,
            })?;
        let path = task_path(&state.id);
        self.store
            .create_or_set(&path, encode(&path, state)?)
            .await?;
        debug!(task_id = %state.id, "Saved task state");
        Ok(())
    }

    /// Delete a task record. Returns `false` if nothing was stored.
    pub async fn delete(&self, id: &TaskId) -> Result<bool> {
        let path = task_path(id);
        if self.store.get(&path).await?.is_none() {
            return Ok(false);
        }
        self.store.delete(&path).await?;
        debug!(task_id = %id, "Deleted task state");
        Ok(true)
    }
}
