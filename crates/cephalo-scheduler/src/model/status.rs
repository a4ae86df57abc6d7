// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task status updates reported by the cluster scheduler.

use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// Scheduler-reported task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted, not yet started.
    Staging,
    /// Starting on the agent.
    Starting,
    /// Running.
    Running,
    /// Kill in progress.
    Killing,
    /// Exited successfully.
    Finished,
    /// Exited with an error.
    Failed,
    /// Killed on request.
    Killed,
    /// Lost together with its agent.
    Lost,
    /// Could not be launched.
    Error,
}

impl TaskState {
    /// Whether the task is gone for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Lost | Self::Error
        )
    }
}

/// A status update for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Task the update is for.
    pub task_id: TaskId,
    /// Agent reporting the update.
    pub slave_id: Option<String>,
    /// New state.
    pub state: TaskState,
    /// Free-form reason.
    pub message: Option<String>,
}

impl TaskStatus {
    /// Status without agent or message.
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            slave_id: None,
            state,
            message: None,
        }
    }
}
