// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for cephalo-scheduler.
//!
//! Offer matching outcomes are never errors: an offer nobody can use is
//! declined. Errors here mean the engine cannot continue.

use cephalo_kv::KvError;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;

/// Result type using the scheduler Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Scheduler errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// KV store operation failed. Always fatal for the engine.
    #[error("KV store error: {0}")]
    Kv(#[from] KvError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Operator deployment document is invalid.
    #[error("Invalid deployment: {0}")]
    InvalidDeployment(String),

    /// A task record would break a persisted-state invariant.
    #[error("Invariant violated for task {task_id}: {reason}")]
    InvariantViolation {
        /// The offending task.
        task_id: Uuid,
        /// The broken invariant.
        reason: &'static str,
    },

    /// The configuration bundle could not be built or read.
    #[error("Bundle error: {0}")]
    Bundle(String),

    /// The engine loop is no longer running.
    #[error("Engine stopped")]
    EngineStopped,

    /// The store crashed; the engine must be rebuilt on a fresh store.
    #[error("Store crashed: {cause}")]
    Fatal {
        /// The first store failure.
        cause: KvError,
    },
}

impl Error {
    /// Whether the error ends the engine loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Kv(_) | Self::Fatal { .. })
    }
}
