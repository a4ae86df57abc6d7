// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for cephalo-kv.
//!
//! `KvError` is `Clone` because a single failure is fanned out through
//! [`Latch`](crate::Latch) to every observer of a lock, watch or crash signal.

use thiserror::Error;

/// Result type using KvError.
pub type Result<T> = std::result::Result<T, KvError>;

/// Errors returned by KV store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum KvError {
    /// No value is stored at the path.
    #[error("No value at path '{path}'")]
    NotFound {
        /// The path that was looked up.
        path: String,
    },

    /// A value is already stored at the path.
    #[error("Value already exists at path '{path}'")]
    AlreadyExists {
        /// The path that was written.
        path: String,
    },

    /// The path is not a valid hierarchical key.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },

    /// Backend I/O failed.
    #[error("IO error during '{operation}': {details}")]
    Io {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A stored value could not be encoded or decoded by a typed layer.
    #[error("Codec error at path '{path}': {details}")]
    Codec {
        /// The path holding the value.
        path: String,
        /// Error details.
        details: String,
    },

    /// The coordination session backing the store is gone.
    #[error("Store session expired")]
    SessionExpired,

    /// A held lock was lost before it was released.
    #[error("Lock on '{path}' was lost")]
    LockLost {
        /// The locked path.
        path: String,
    },

    /// An active watch stopped delivering notifications.
    #[error("Watch on '{path}' was closed: {reason}")]
    WatchClosed {
        /// The watched path.
        path: String,
        /// Why the watch ended.
        reason: String,
    },

    /// The store crashed earlier; this call never reached the backend.
    #[error("Store already crashed: {cause}")]
    AlreadyCrashed {
        /// The first failure observed by the store.
        cause: Box<KvError>,
    },
}

impl KvError {
    /// Whether this error means the store can no longer be trusted.
    ///
    /// `NotFound`, `AlreadyExists` and `InvalidPath` are caller-level outcomes;
    /// everything else points at a broken session or corrupted durable state.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NotFound { .. } | Self::AlreadyExists { .. } | Self::InvalidPath { .. }
        )
    }

    /// The original failure behind an `AlreadyCrashed` chain.
    pub fn root_cause(&self) -> &KvError {
        match self {
            Self::AlreadyCrashed { cause } => cause.root_cause(),
            other => other,
        }
    }

    pub(crate) fn io(operation: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            details: err.to_string(),
        }
    }
}
